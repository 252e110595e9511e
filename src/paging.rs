use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use futures::Stream;
use reqwest::Method;
use serde_json::Value as JsonValue;
use url::Url;

use crate::client::{Client, Fetched};
use crate::error::{Error, Result};
use crate::model::{Entity, Model, ResponseMeta};
use crate::utils::with_query;

/// A paginated API listing. Holds every item fetched so far plus the cursors
/// needed to fetch more; [`advance`][PagedList::advance] appends the next
/// page in place, so items already handed out stay valid.
///
/// ```no_run
/// # use rsroyale::client::{Client, FetchOptions};
/// # use rsroyale::clan::ClanFilter;
/// # async fn run() -> rsroyale::error::Result<()> {
/// # let client = Client::new("token")?;
/// let mut clans = client
///     .search_clans(ClanFilter::default().name("rats"), FetchOptions::default())
///     .await?;
///
/// while clans.advance().await? {}
/// println!("found {} clans", clans.len());
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct PagedList<M: Model> {
    client: Client,
    source_url: Url,
    items: Vec<M>,
    after: Option<String>,
    before: Option<String>,
}

impl<M: Model> PagedList<M> {
    /// Builds a list from the first page's envelope (`items` array plus a
    /// `paging` descriptor).
    pub(crate) fn from_page(
        client: Client,
        source_url: Url,
        payload: JsonValue,
        cached: bool,
        at: DateTime<Utc>,
        meta: Option<ResponseMeta>,
    ) -> Result<PagedList<M>> {
        let mut list = PagedList {
            client,
            source_url,
            items: Vec::new(),
            after: None,
            before: None,
        };
        list.absorb(payload, cached, at, meta)?;
        Ok(list)
    }

    /// Appends one page's items and replaces the cursors with the page's
    /// own. Returns how many items the page carried.
    fn absorb(
        &mut self,
        payload: JsonValue,
        cached: bool,
        at: DateTime<Utc>,
        meta: Option<ResponseMeta>,
    ) -> Result<usize> {
        let JsonValue::Object(mut map) = payload else {
            return Err(Error::Decode(format!(
                "expected a paginated envelope, got {}",
                payload
            )));
        };

        let JsonValue::Array(values) = map.remove("items").unwrap_or(JsonValue::Null) else {
            return Err(Error::Decode(String::from(
                "paginated envelope has no items array",
            )));
        };

        let cursors = map
            .get("paging")
            .and_then(|p| p.get("cursors"))
            .and_then(JsonValue::as_object);
        self.after = cursors
            .and_then(|c| c.get("after"))
            .and_then(JsonValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self.before = cursors
            .and_then(|c| c.get("before"))
            .and_then(JsonValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let count = values.len();
        self.items.extend(values.into_iter().map(|v| {
            M::from_entity(Entity::new(
                self.client.clone(),
                self.source_url.clone(),
                v,
                cached,
                at,
                meta.clone(),
            ))
        }));

        Ok(count)
    }

    /// Fetches the next page and appends it. Returns `false` when there is
    /// no further page; the list is then complete.
    pub async fn advance(&mut self) -> Result<bool> {
        let Some(cursor) = self.after.clone() else {
            return Ok(false);
        };

        let url = with_query(self.source_url.clone(), &[("after", cursor)]);
        let fetched = self
            .client
            .perform(url, Method::GET, None, None, false)
            .await?;
        self.absorb(fetched.payload, fetched.cached, fetched.at, fetched.meta)?;

        Ok(true)
    }

    /// Keeps advancing until the listing is exhausted.
    pub async fn drain_all(&mut self) -> Result<()> {
        while self.advance().await? {}
        Ok(())
    }

    /// The items fetched so far.
    pub fn items(&self) -> &[M] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, M> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The cursor for the page after the last one fetched, if any.
    pub fn cursor_after(&self) -> Option<&str> {
        self.after.as_deref()
    }

    /// The cursor for the page before the first one fetched, if any.
    pub fn cursor_before(&self) -> Option<&str> {
        self.before.as_deref()
    }

    /// The canonical URL of the first page.
    pub fn source_url(&self) -> &Url {
        &self.source_url
    }

    /// Returns a [`Stream`] over the whole listing, fetching further pages
    /// lazily as the already-fetched items run out.
    ///
    /// ```no_run
    /// # use rsroyale::client::{Client, FetchOptions};
    /// # use rsroyale::clan::ClanFilter;
    /// # use futures::prelude::*;
    /// # async fn run() -> rsroyale::error::Result<()> {
    /// # let client = Client::new("token")?;
    /// let mut clans = client
    ///     .search_clans(ClanFilter::default().name("rats"), FetchOptions::default())
    ///     .await?;
    ///
    /// let mut stream = clans.stream();
    /// while let Some(clan) = stream.try_next().await? {
    ///     println!("{:?}", clan.name());
    /// }
    /// # Ok(()) }
    /// ```
    pub fn stream(&mut self) -> PageStream<'_, M> {
        PageStream {
            list: self,
            index: 0,
            query: None,
            ended: false,
        }
    }
}

impl<'a, M: Model> IntoIterator for &'a PagedList<M> {
    type Item = &'a M;
    type IntoIter = std::slice::Iter<'a, M>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Lazily fetching stream over a [`PagedList`]. Yields the items already in
/// the list first, then requests page after page until a page comes back
/// empty or without a cursor.
pub struct PageStream<'a, M: Model> {
    list: &'a mut PagedList<M>,
    index: usize,
    query: Option<BoxFuture<'static, Result<Fetched>>>,
    ended: bool,
}

impl<'a, M: Model> Stream for PageStream<'a, M> {
    type Item = Result<M>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.index < this.list.items.len() {
                let item = this.list.items[this.index].clone();
                this.index += 1;
                return Poll::Ready(Some(Ok(item)));
            }

            if this.ended {
                return Poll::Ready(None);
            }

            match this.query.as_mut() {
                None => {
                    let Some(cursor) = this.list.after.clone() else {
                        this.ended = true;
                        return Poll::Ready(None);
                    };

                    let client = this.list.client.clone();
                    let url = with_query(this.list.source_url.clone(), &[("after", cursor)]);
                    this.query = Some(Box::pin(async move {
                        client.perform(url, Method::GET, None, None, false).await
                    }));
                }
                Some(query) => match query.poll_unpin(cx) {
                    Poll::Ready(result) => {
                        this.query = None;

                        match result.and_then(|fetched| {
                            this.list.absorb(
                                fetched.payload,
                                fetched.cached,
                                fetched.at,
                                fetched.meta,
                            )
                        }) {
                            Ok(0) => {
                                this.ended = true;
                                return Poll::Ready(None);
                            }
                            Ok(_) => {}
                            Err(e) => {
                                this.ended = true;
                                return Poll::Ready(Some(Err(e)));
                            }
                        }
                    }
                    Poll::Pending => return Poll::Pending,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use mockito::mock;
    use serde_json::json;

    fn test_client() -> Client {
        Client::builder("token")
            .base_url(mockito::server_url())
            .build()
            .unwrap()
    }

    fn page(tags: &[&str], after: Option<&str>) -> JsonValue {
        let cursors = match after {
            Some(c) => json!({"after": c}),
            None => json!({}),
        };
        json!({
            "items": tags.iter().map(|t| json!({"tag": t})).collect::<Vec<_>>(),
            "paging": {"cursors": cursors}
        })
    }

    fn first_page(client: &Client, path: &str, tags: &[&str], after: Option<&str>) -> PagedList<Entity> {
        let url = client.endpoint(path, &[]).unwrap();
        PagedList::from_page(
            client.clone(),
            url,
            page(tags, after),
            false,
            Utc::now(),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn advance_without_a_cursor_reports_exhaustion() {
        let client = test_client();
        let mut list = first_page(&client, "/pg/done", &["#A"], None);

        assert_eq!(list.len(), 1);
        assert!(!list.advance().await.unwrap());
    }

    #[tokio::test]
    async fn advance_appends_and_replaces_the_cursor() {
        let client = test_client();
        let m = mock("GET", "/pg/two?after=c2")
            .with_body(page(&["#B", "#C"], None).to_string())
            .expect(1)
            .create();

        let mut list = first_page(&client, "/pg/two", &["#A"], Some("c2"));
        assert!(list.advance().await.unwrap());

        assert_eq!(list.len(), 3);
        assert_eq!(list.items()[2].str_of("tag"), Some("#C"));
        assert_eq!(list.cursor_after(), None);
        assert!(!list.advance().await.unwrap());
        m.assert();
    }

    #[tokio::test]
    async fn drain_all_walks_every_page() {
        let client = test_client();
        let _m2 = mock("GET", "/pg/all?after=c2")
            .with_body(page(&["#B"], Some("c3")).to_string())
            .create();
        let _m3 = mock("GET", "/pg/all?after=c3")
            .with_body(page(&["#C"], None).to_string())
            .create();

        let mut list = first_page(&client, "/pg/all", &["#A"], Some("c2"));
        list.drain_all().await.unwrap();

        let tags: Vec<_> = list.iter().filter_map(|e| e.str_of("tag")).collect();
        assert_eq!(tags, ["#A", "#B", "#C"]);
    }

    #[tokio::test]
    async fn stream_fetches_pages_lazily() {
        let client = test_client();
        let m = mock("GET", "/pg/stream?after=c2")
            .with_body(page(&["#B"], None).to_string())
            .expect(1)
            .create();

        let mut list = first_page(&client, "/pg/stream", &["#A"], Some("c2"));
        let mut stream = list.stream();

        // The first item comes from memory; no request has happened yet.
        let first = stream.try_next().await.unwrap().unwrap();
        assert_eq!(first.str_of("tag"), Some("#A"));

        let second = stream.try_next().await.unwrap().unwrap();
        assert_eq!(second.str_of("tag"), Some("#B"));
        assert!(stream.try_next().await.unwrap().is_none());
        m.assert();
    }

    #[tokio::test]
    async fn stream_ends_on_an_empty_page() {
        let client = test_client();
        let _m = mock("GET", "/pg/empty?after=c2")
            .with_body(page(&[], Some("c3")).to_string())
            .create();

        let mut list = first_page(&client, "/pg/empty", &["#A"], Some("c2"));
        let items: Vec<Entity> = list.stream().try_collect().await.unwrap();

        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn malformed_envelope_is_a_decode_error() {
        let client = test_client();
        let url = client.endpoint("/pg/bad", &[]).unwrap();

        let err = PagedList::<Entity>::from_page(
            client,
            url,
            json!({"paging": {"cursors": {}}}),
            false,
            Utc::now(),
            None,
        )
        .unwrap_err();

        assert!(matches!(err, Error::Decode(_)));
    }
}
