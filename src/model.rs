use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use url::Url;

use crate::clan::Clan;
use crate::client::{Client, Fetched};
use crate::error::{Error, Result};
use crate::paging::PagedList;
use crate::player::Player;
use crate::utils::{to_camel_case, to_snake_case};

/// Status and headers of the transport response an [`Entity`] came from.
/// Absent when the entity was served from the cache.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: u16,
    pub headers: HeaderMap,
}

/// A single decoded JSON object returned by the API, together with where it
/// came from and how fresh it is.
///
/// Field access goes through [`Entity::get`], a projection over the decoded
/// value that accepts both snake_case and camelCase spellings of a key:
///
/// ```no_run
/// # use rsroyale::client::Client;
/// # use rsroyale::model::Model;
/// # async fn run() -> rsroyale::error::Result<()> {
/// # let client = Client::new("token")?;
/// let player = client.get_player("#2P0LYQ").await?;
/// let entity = player.entity();
///
/// // The API sends `expLevel`; both spellings resolve to the same value.
/// assert_eq!(entity.get("exp_level"), entity.get("expLevel"));
/// # Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub struct Entity {
    client: Client,
    source_url: Url,
    raw: JsonValue,
    cached: bool,
    last_updated: DateTime<Utc>,
    meta: Option<ResponseMeta>,
}

impl Entity {
    pub(crate) fn new(
        client: Client,
        source_url: Url,
        raw: JsonValue,
        cached: bool,
        last_updated: DateTime<Utc>,
        meta: Option<ResponseMeta>,
    ) -> Entity {
        Entity {
            client,
            source_url,
            raw,
            cached,
            last_updated,
            meta,
        }
    }

    /// The raw decoded payload.
    pub fn raw(&self) -> &JsonValue {
        &self.raw
    }

    /// Looks up a top-level field, trying the key as given, then its
    /// camelCase spelling, then its snake_case spelling.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        let map = self.raw.as_object()?;

        map.get(key)
            .or_else(|| map.get(&to_camel_case(key)))
            .or_else(|| map.get(&to_snake_case(key)))
    }

    /// [`Entity::get`] narrowed to string fields.
    pub fn str_of(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(JsonValue::as_str)
    }

    /// [`Entity::get`] narrowed to integer fields.
    pub fn u64_of(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(JsonValue::as_u64)
    }

    /// Deserializes the payload into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.raw.clone())?)
    }

    /// Whether this data was served from the local cache.
    pub fn cached(&self) -> bool {
        self.cached
    }

    /// When the data was fetched, or when it was written to the cache if
    /// [`cached`][Entity::cached] is true.
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// The canonical URL this entity was loaded from, used by refresh.
    pub fn source_url(&self) -> &Url {
        &self.source_url
    }

    /// Transport metadata, absent for cache-served data.
    pub fn meta(&self) -> Option<&ResponseMeta> {
        self.meta.as_ref()
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    /// Re-fetches this entity from its source URL, bypassing the cache, and
    /// replaces the payload, freshness flag and timestamp in place. Existing
    /// references observe the update; no new object is created.
    pub async fn refresh(&mut self) -> Result<()> {
        let fetched = self
            .client
            .perform(self.source_url.clone(), Method::GET, None, None, true)
            .await?;

        self.raw = fetched.payload;
        self.cached = fetched.cached;
        self.last_updated = fetched.at;
        self.meta = fetched.meta;

        Ok(())
    }
}

/// A typed wrapper around an [`Entity`]. Implemented by the concrete model
/// kinds so the conversion layer can produce them generically.
pub trait Model: Clone + Sized {
    fn from_entity(entity: Entity) -> Self;
    fn entity(&self) -> &Entity;
    fn entity_mut(&mut self) -> &mut Entity;
}

impl Model for Entity {
    fn from_entity(entity: Entity) -> Entity {
        entity
    }

    fn entity(&self) -> &Entity {
        self
    }

    fn entity_mut(&mut self) -> &mut Entity {
        self
    }
}

/// Values that can re-fetch themselves from their source URL.
pub trait Refreshable {
    /// Re-fetches from the API, bypassing the cache, mutating in place.
    fn refresh(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Models carrying a reference to a clan that can be resolved on demand.
pub trait ClanLinked {
    /// The tag of the linked clan, if there is one.
    fn clan_tag(&self) -> Option<String>;

    /// Fetches the full clan this value points at.
    fn fetch_clan(&self) -> BoxFuture<'_, Result<Clan>>;
}

/// Models carrying a player tag that can be resolved to a full profile.
pub trait PlayerLinked {
    /// The tag of the linked player, if there is one.
    fn player_tag(&self) -> Option<String>;

    /// Fetches the full player profile this value points at.
    fn fetch_player(&self) -> BoxFuture<'_, Result<Player>>;
}

/// A refreshable list of plain strings, as returned by the endpoints
/// listing. Strings carry no source object of their own, so the whole list
/// refreshes as one unit.
#[derive(Debug, Clone)]
pub struct StringList {
    client: Client,
    source_url: Url,
    items: Vec<String>,
    cached: bool,
    last_updated: DateTime<Utc>,
}

impl StringList {
    fn new(
        client: Client,
        source_url: Url,
        values: Vec<JsonValue>,
        cached: bool,
        last_updated: DateTime<Utc>,
    ) -> StringList {
        StringList {
            client,
            source_url,
            items: values
                .into_iter()
                .filter_map(|v| match v {
                    JsonValue::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            cached,
            last_updated,
        }
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cached(&self) -> bool {
        self.cached
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

impl Refreshable for StringList {
    fn refresh(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let fetched = self
                .client
                .perform(self.source_url.clone(), Method::GET, None, None, true)
                .await?;

            self.items = match fetched.payload {
                JsonValue::Array(values) => values
                    .into_iter()
                    .filter_map(|v| match v {
                        JsonValue::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
                other => {
                    return Err(Error::Decode(format!(
                        "expected an array of strings, got {}",
                        other
                    )))
                }
            };
            self.cached = fetched.cached;
            self.last_updated = fetched.at;

            Ok(())
        })
    }
}

/// The result of converting a classified payload. The API mixes single
/// objects, bare arrays, paginated envelopes and plain strings across its
/// endpoints; accessors narrow this to the shape they document.
#[derive(Debug)]
pub enum Converted<M: Model> {
    /// A primitive string payload (version endpoint). Not refreshable.
    Text(String),
    /// An array of strings (endpoints listing), refreshable as a unit.
    Strings(StringList),
    /// A bare array of objects.
    Many(Vec<M>),
    /// An `items` array with a paging descriptor.
    Paged(PagedList<M>),
    /// A single object.
    One(M),
}

impl<M: Model> Converted<M> {
    pub fn one(self) -> Result<M> {
        match self {
            Converted::One(m) => Ok(m),
            other => Err(other.shape_error("a single object")),
        }
    }

    pub fn many(self) -> Result<Vec<M>> {
        match self {
            Converted::Many(items) => Ok(items),
            other => Err(other.shape_error("an array of objects")),
        }
    }

    pub fn paged(self) -> Result<PagedList<M>> {
        match self {
            Converted::Paged(list) => Ok(list),
            other => Err(other.shape_error("a paginated list")),
        }
    }

    pub fn text(self) -> Result<String> {
        match self {
            Converted::Text(s) => Ok(s),
            other => Err(other.shape_error("a plain string")),
        }
    }

    pub fn strings(self) -> Result<StringList> {
        match self {
            Converted::Strings(list) => Ok(list),
            other => Err(other.shape_error("an array of strings")),
        }
    }

    fn shape_error(&self, expected: &str) -> Error {
        let got = match self {
            Converted::Text(_) => "a plain string",
            Converted::Strings(_) => "an array of strings",
            Converted::Many(_) => "an array of objects",
            Converted::Paged(_) => "a paginated list",
            Converted::One(_) => "a single object",
        };
        Error::Decode(format!("expected {}, got {}", expected, got))
    }
}

/// Turns a classified payload into typed models. Classification order, first
/// match wins: primitive string; non-empty array of strings; array of
/// objects (an empty array lands here, so empty listings stay lists); object
/// with `items` and a paging descriptor; object with `items` only (unwrapped
/// and reclassified); anything else is a single entity.
pub(crate) fn convert<M: Model>(
    client: Client,
    source_url: Url,
    fetched: Fetched,
) -> Result<Converted<M>> {
    let Fetched {
        payload,
        cached,
        at,
        meta,
    } = fetched;

    match payload {
        JsonValue::String(s) => Ok(Converted::Text(s)),
        JsonValue::Array(values) if !values.is_empty() && values.iter().all(JsonValue::is_string) => Ok(
            Converted::Strings(StringList::new(client, source_url, values, cached, at)),
        ),
        JsonValue::Array(values) => Ok(Converted::Many(
            values
                .into_iter()
                .map(|v| {
                    M::from_entity(Entity::new(
                        client.clone(),
                        source_url.clone(),
                        v,
                        cached,
                        at,
                        meta.clone(),
                    ))
                })
                .collect(),
        )),
        JsonValue::Object(map) if map.contains_key("items") => {
            let has_paging = map
                .get("paging")
                .and_then(JsonValue::as_object)
                .map_or(false, |p| !p.is_empty());

            if has_paging {
                Ok(Converted::Paged(PagedList::from_page(
                    client,
                    source_url,
                    JsonValue::Object(map),
                    cached,
                    at,
                    meta,
                )?))
            } else {
                // No paging descriptor: unwrap the items array and classify it.
                let items = map.get("items").cloned().unwrap_or(JsonValue::Null);
                convert(
                    client,
                    source_url,
                    Fetched {
                        payload: items,
                        cached,
                        at,
                        meta,
                    },
                )
            }
        }
        other => Ok(Converted::One(M::from_entity(Entity::new(
            client, source_url, other, cached, at, meta,
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_client() -> Client {
        Client::builder("token")
            .base_url("https://api.example.com")
            .build()
            .unwrap()
    }

    fn fetched(payload: JsonValue) -> Fetched {
        Fetched {
            payload,
            cached: false,
            at: Utc::now(),
            meta: None,
        }
    }

    fn url() -> Url {
        Url::parse("https://api.example.com/players/%23ABC").unwrap()
    }

    #[test]
    fn string_payload_converts_to_text() {
        let out = convert::<Entity>(test_client(), url(), fetched(json!("4.0.1"))).unwrap();
        assert_eq!(out.text().unwrap(), "4.0.1");
    }

    #[test]
    fn string_array_converts_to_string_list() {
        let out = convert::<Entity>(
            test_client(),
            url(),
            fetched(json!(["/players", "/clans"])),
        )
        .unwrap();

        let list = out.strings().unwrap();
        assert_eq!(list.items(), ["/players", "/clans"]);
    }

    #[test]
    fn object_array_converts_to_many() {
        let out = convert::<Entity>(
            test_client(),
            url(),
            fetched(json!([{"tag": "#A"}, {"tag": "#B"}])),
        )
        .unwrap();

        let items = out.many().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].str_of("tag"), Some("#B"));
    }

    #[test]
    fn empty_array_converts_to_an_empty_many() {
        let out = convert::<Entity>(test_client(), url(), fetched(json!([]))).unwrap();
        assert!(out.many().unwrap().is_empty());
    }

    #[test]
    fn items_with_paging_converts_to_paged() {
        let out = convert::<Entity>(
            test_client(),
            url(),
            fetched(json!({
                "items": [{"tag": "#A"}],
                "paging": {"cursors": {"after": "X"}}
            })),
        )
        .unwrap();

        let list = out.paged().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.cursor_after(), Some("X"));
    }

    #[test]
    fn items_without_paging_unwraps_to_many() {
        let out = convert::<Entity>(
            test_client(),
            url(),
            fetched(json!({"items": [{"tag": "#A"}], "paging": {}})),
        )
        .unwrap();

        assert_eq!(out.many().unwrap().len(), 1);
    }

    #[test]
    fn bare_object_converts_to_one() {
        let out = convert::<Entity>(
            test_client(),
            url(),
            fetched(json!({"tag": "#A", "name": "rat"})),
        )
        .unwrap();

        let entity = out.one().unwrap();
        assert_eq!(entity.str_of("name"), Some("rat"));
        assert!(!entity.cached());
    }

    #[test]
    fn shape_mismatch_is_a_decode_error() {
        let out = convert::<Entity>(test_client(), url(), fetched(json!({"tag": "#A"}))).unwrap();
        assert!(matches!(out.many(), Err(Error::Decode(_))));
    }

    #[test]
    fn key_lookup_is_case_insensitive_both_ways() {
        let entity = Entity::new(
            test_client(),
            url(),
            json!({"expLevel": 13, "clan_rank": 2}),
            false,
            Utc::now(),
            None,
        );

        assert_eq!(entity.u64_of("exp_level"), Some(13));
        assert_eq!(entity.u64_of("expLevel"), Some(13));
        assert_eq!(entity.u64_of("clanRank"), Some(2));
        assert_eq!(entity.get("nope"), None);
    }
}
