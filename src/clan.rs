use futures::future::BoxFuture;
use reqwest::Method;
use serde_json::Value as JsonValue;

use crate::client::{Client, FetchOptions};
use crate::error::{Error, Result};
use crate::model::{Entity, Model, PlayerLinked, Refreshable};
use crate::paging::PagedList;
use crate::player::Player;
use crate::tag;

/// A clan profile. The member roster embedded in the profile is decomposed
/// into [`Member`] values at construction time, each carrying the clan's tag
/// as a back-reference.
#[derive(Debug, Clone)]
pub struct Clan {
    entity: Entity,
    members: Vec<Member>,
}

impl Clan {
    /// The clan's tag, e.g. `#2CCCP`.
    pub fn tag(&self) -> Option<&str> {
        self.entity.str_of("tag")
    }

    /// The clan's display name.
    pub fn name(&self) -> Option<&str> {
        self.entity.str_of("name")
    }

    /// The clan's total score.
    pub fn clan_score(&self) -> Option<u64> {
        self.entity.u64_of("clan_score")
    }

    /// The member roster embedded in the profile.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    fn build_members(entity: &Entity) -> Vec<Member> {
        let clan_tag = entity.str_of("tag").map(str::to_string);

        let Some(JsonValue::Array(roster)) = entity.get("member_list").cloned() else {
            return Vec::new();
        };

        roster
            .into_iter()
            .map(|value| Member {
                entity: Entity::new(
                    entity.client().clone(),
                    entity.source_url().clone(),
                    value,
                    entity.cached(),
                    entity.last_updated(),
                    entity.meta().cloned(),
                ),
                clan_tag: clan_tag.clone(),
            })
            .collect()
    }
}

impl Model for Clan {
    fn from_entity(entity: Entity) -> Clan {
        let members = Clan::build_members(&entity);
        Clan { entity, members }
    }

    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }
}

impl Refreshable for Clan {
    fn refresh(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.entity.refresh().await?;
            self.members = Clan::build_members(&self.entity);
            Ok(())
        })
    }
}

/// One entry of a clan's member roster. Knows which clan it belongs to, so
/// the full profile of either side can be fetched from it.
#[derive(Debug, Clone)]
pub struct Member {
    entity: Entity,
    clan_tag: Option<String>,
}

impl Member {
    /// The member's player tag.
    pub fn tag(&self) -> Option<&str> {
        self.entity.str_of("tag")
    }

    /// The member's display name.
    pub fn name(&self) -> Option<&str> {
        self.entity.str_of("name")
    }

    /// The member's clan role (member, elder, coLeader, leader).
    pub fn role(&self) -> Option<&str> {
        self.entity.str_of("role")
    }

    /// The tag of the clan this roster entry came from.
    pub fn clan_tag(&self) -> Option<&str> {
        self.clan_tag.as_deref()
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Fetches the full clan this member belongs to.
    pub async fn fetch_clan(&self) -> Result<Clan> {
        let Some(tag) = &self.clan_tag else {
            return Err(Error::Validation(String::from(
                "member has no clan back-reference",
            )));
        };
        self.entity.client().get_clan(tag).await
    }
}

impl PlayerLinked for Member {
    fn player_tag(&self) -> Option<String> {
        self.tag().map(str::to_string)
    }

    fn fetch_player(&self) -> BoxFuture<'_, Result<Player>> {
        Box::pin(async move {
            let Some(tag) = self.player_tag() else {
                return Err(Error::Validation(String::from(
                    "roster entry carries no player tag",
                )));
            };
            self.entity.client().get_player(&tag).await
        })
    }
}

/// Search criteria for [`Client::search_clans`]. At least one criterion must
/// be set, and a name filter must be at least three characters long; both
/// rules are enforced locally before any request is made.
#[derive(Debug, Clone, Default)]
pub struct ClanFilter {
    name: Option<String>,
    location_id: Option<u64>,
    min_members: Option<u32>,
    max_members: Option<u32>,
    min_score: Option<u64>,
}

impl ClanFilter {
    /// Filter by clan name (minimum three characters).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Filter by location identifier.
    pub fn location_id(mut self, id: u64) -> Self {
        self.location_id = Some(id);
        self
    }

    /// Only clans with at least this many members.
    pub fn min_members(mut self, n: u32) -> Self {
        self.min_members = Some(n);
        self
    }

    /// Only clans with at most this many members.
    pub fn max_members(mut self, n: u32) -> Self {
        self.max_members = Some(n);
        self
    }

    /// Only clans with at least this score.
    pub fn min_score(mut self, score: u64) -> Self {
        self.min_score = Some(score);
        self
    }

    fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if name.chars().count() < 3 {
                return Err(Error::Validation(String::from(
                    "clan name filter must be at least 3 characters long",
                )));
            }
        }

        if self.name.is_none()
            && self.location_id.is_none()
            && self.min_members.is_none()
            && self.max_members.is_none()
            && self.min_score.is_none()
        {
            return Err(Error::Validation(String::from(
                "clan search needs at least one filtering criterion",
            )));
        }

        Ok(())
    }

    fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(name) = &self.name {
            params.push(("name", name.clone()));
        }
        if let Some(id) = self.location_id {
            params.push(("locationId", id.to_string()));
        }
        if let Some(n) = self.min_members {
            params.push(("minMembers", n.to_string()));
        }
        if let Some(n) = self.max_members {
            params.push(("maxMembers", n.to_string()));
        }
        if let Some(score) = self.min_score {
            params.push(("minScore", score.to_string()));
        }
        params
    }
}

impl Client {
    /// Gets a clan's profile by tag, roster included.
    pub async fn get_clan(&self, tag: &str) -> Result<Clan> {
        let url = self.endpoint(&format!("/clans/{}", tag::normalize(tag)?), &[])?;
        self.get_model(url, Method::GET, None, None).await?.one()
    }

    /// Gets a clan's member roster as a paginated listing.
    pub async fn get_clan_members(
        &self,
        tag: &str,
        options: FetchOptions,
    ) -> Result<PagedList<Entity>> {
        let url = self.endpoint(
            &format!("/clans/{}/members", tag::normalize(tag)?),
            &options.to_params(),
        )?;
        self.get_model(url, Method::GET, options.timeout, None)
            .await?
            .paged()
    }

    /// Searches for clans matching `filter`. The filter is validated
    /// locally; an empty or under-specified filter never reaches the API.
    pub async fn search_clans(
        &self,
        filter: ClanFilter,
        options: FetchOptions,
    ) -> Result<PagedList<Clan>> {
        filter.validate()?;

        let mut params = filter.to_params();
        params.extend(options.to_params());

        let url = self.endpoint("/clans", &params)?;
        self.get_model(url, Method::GET, options.timeout, None)
            .await?
            .paged()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::mock;

    fn test_client() -> Client {
        Client::builder("token")
            .base_url(mockito::server_url())
            .build()
            .unwrap()
    }

    const CLAN_BODY: &str = r##"{
        "tag": "#2CCCP",
        "name": "rats",
        "clanScore": 45000,
        "memberList": [
            {"tag": "#2P0LYQ", "name": "rat", "role": "leader"},
            {"tag": "#8QU8J9LP", "name": "mouse", "role": "member"}
        ]
    }"##;

    #[tokio::test]
    async fn roster_is_decomposed_with_a_back_reference() {
        let client = test_client();
        let _m = mock("GET", "/clans/%232CCCP").with_body(CLAN_BODY).create();

        let clan = client.get_clan("#2CCCP").await.unwrap();

        assert_eq!(clan.name(), Some("rats"));
        assert_eq!(clan.clan_score(), Some(45000));
        assert_eq!(clan.members().len(), 2);

        let leader = &clan.members()[0];
        assert_eq!(leader.role(), Some("leader"));
        assert_eq!(leader.clan_tag(), Some("#2CCCP"));
    }

    #[tokio::test]
    async fn member_resolves_to_a_full_player_profile() {
        let client = test_client();
        let _c = mock("GET", "/clans/%232CCCP").with_body(CLAN_BODY).create();
        let p = mock("GET", "/players/%232P0LYQ")
            .with_body(r##"{"tag": "#2P0LYQ", "name": "rat", "trophies": 6000}"##)
            .expect(1)
            .create();

        let clan = client.get_clan("#2CCCP").await.unwrap();
        let player = clan.members()[0].fetch_player().await.unwrap();

        assert_eq!(player.trophies(), Some(6000));
        p.assert();
    }

    #[tokio::test]
    async fn refresh_rebuilds_the_roster() {
        let client = test_client();

        let first = mock("GET", "/clans/%232CCCP").with_body(CLAN_BODY).create();
        let mut clan = client.get_clan("#2CCCP").await.unwrap();
        assert_eq!(clan.members().len(), 2);
        drop(first);

        let _second = mock("GET", "/clans/%232CCCP")
            .with_body(r##"{"tag": "#2CCCP", "name": "rats", "memberList": []}"##)
            .create();

        clan.refresh().await.unwrap();

        assert!(clan.members().is_empty());
    }

    #[tokio::test]
    async fn members_listing_is_paginated() {
        let client = test_client();
        let _m = mock("GET", "/clans/%232CCCP/members?limit=1")
            .with_body(
                r##"{"items": [{"tag": "#2P0LYQ"}], "paging": {"cursors": {"after": "c2"}}}"##,
            )
            .create();

        let members = client
            .get_clan_members("#2CCCP", FetchOptions::default().limit(1))
            .await
            .unwrap();

        assert_eq!(members.len(), 1);
        assert_eq!(members.cursor_after(), Some("c2"));
    }

    #[tokio::test]
    async fn search_sends_the_whitelisted_criteria() {
        let client = test_client();
        let m = mock("GET", "/clans?limit=3&minMembers=10&name=rats")
            .with_body(r##"{"items": [{"tag": "#A", "name": "rats"}], "paging": {"cursors": {}}}"##)
            .expect(1)
            .create();

        let clans = client
            .search_clans(
                ClanFilter::default().name("rats").min_members(10),
                FetchOptions::default().limit(3),
            )
            .await
            .unwrap();

        assert_eq!(clans.len(), 1);
        assert_eq!(clans.items()[0].name(), Some("rats"));
        m.assert();
    }

    #[tokio::test]
    async fn under_specified_searches_never_reach_the_api() {
        let client = test_client();
        let m = mock("GET", mockito::Matcher::Any).expect(0).create();

        assert!(matches!(
            client
                .search_clans(ClanFilter::default(), FetchOptions::default())
                .await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            client
                .search_clans(ClanFilter::default().name("ab"), FetchOptions::default())
                .await,
            Err(Error::Validation(_))
        ));
        m.assert();
    }
}
