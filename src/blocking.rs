//! A synchronous facade over the async client for callers without a runtime
//! of their own. Every call drives the wrapped async pipeline to completion
//! on an internal single-threaded runtime, so cache, rate-limit and
//! conversion behavior is identical to the async client's.

use tokio::runtime::Runtime;

use crate::clan::{Clan, ClanFilter};
use crate::client::{ClientBuilder, FetchOptions, RateLimitState};
use crate::error::{Error, Result};
use crate::model::{Entity, Model, Refreshable, StringList};
use crate::paging::PagedList;
use crate::player::Player;
use crate::tournament::Tournament;

/// Blocking API client.
///
/// ```no_run
/// # fn run() -> rsroyale::error::Result<()> {
/// let client = rsroyale::blocking::Client::new("my api token")?;
/// let player = client.get_player("#2P0LYQ")?;
/// # Ok(()) }
/// ```
///
/// Must not be used from within an async context; construct
/// [`client::Client`][crate::client::Client] there instead.
#[derive(Debug)]
pub struct Client {
    inner: crate::client::Client,
    rt: Runtime,
}

impl Client {
    /// Creates a blocking client with default settings.
    pub fn new(token: impl Into<String>) -> Result<Client> {
        Client::from_builder(crate::client::Client::builder(token))
    }

    /// Creates a blocking client from a configured [`ClientBuilder`].
    pub fn from_builder(builder: ClientBuilder) -> Result<Client> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::CannotCreateClient(format!("failed to start runtime: {}", e)))?;

        Ok(Client {
            inner: builder.build()?,
            rt,
        })
    }

    pub fn rate_limit(&self) -> RateLimitState {
        self.inner.rate_limit()
    }

    pub fn clear_cache(&self) -> Result<()> {
        self.inner.clear_cache()
    }

    pub fn get_player(&self, tag: &str) -> Result<Player> {
        self.rt.block_on(self.inner.get_player(tag))
    }

    pub fn get_player_battles(&self, tag: &str, options: FetchOptions) -> Result<Vec<Entity>> {
        self.rt.block_on(self.inner.get_player_battles(tag, options))
    }

    pub fn get_player_chests(&self, tag: &str) -> Result<Entity> {
        self.rt.block_on(self.inner.get_player_chests(tag))
    }

    pub fn verify_player_token(&self, tag: &str, token: &str) -> Result<Entity> {
        self.rt.block_on(self.inner.verify_player_token(tag, token))
    }

    pub fn get_clan(&self, tag: &str) -> Result<Clan> {
        self.rt.block_on(self.inner.get_clan(tag))
    }

    pub fn get_clan_members(&self, tag: &str, options: FetchOptions) -> Result<PagedList<Entity>> {
        self.rt.block_on(self.inner.get_clan_members(tag, options))
    }

    pub fn search_clans(
        &self,
        filter: ClanFilter,
        options: FetchOptions,
    ) -> Result<PagedList<Clan>> {
        self.rt.block_on(self.inner.search_clans(filter, options))
    }

    pub fn get_tournament(&self, tag: &str) -> Result<Tournament> {
        self.rt.block_on(self.inner.get_tournament(tag))
    }

    pub fn search_tournaments(
        &self,
        name: &str,
        options: FetchOptions,
    ) -> Result<PagedList<Tournament>> {
        self.rt.block_on(self.inner.search_tournaments(name, options))
    }

    pub fn version(&self) -> Result<String> {
        self.rt.block_on(self.inner.version())
    }

    pub fn endpoints(&self) -> Result<StringList> {
        self.rt.block_on(self.inner.endpoints())
    }

    pub fn auth_stats(&self) -> Result<Entity> {
        self.rt.block_on(self.inner.auth_stats())
    }

    pub fn constants(&self, options: FetchOptions) -> Result<Entity> {
        self.rt.block_on(self.inner.constants(options))
    }

    /// Re-fetches `value` in place, bypassing the cache.
    pub fn refresh<R: Refreshable>(&self, value: &mut R) -> Result<()> {
        self.rt.block_on(value.refresh())
    }

    /// Fetches and appends the next page of `list`. Returns `false` when the
    /// listing is exhausted.
    pub fn advance<M: Model>(&self, list: &mut PagedList<M>) -> Result<bool> {
        self.rt.block_on(list.advance())
    }

    /// Fetches every remaining page of `list`.
    pub fn drain_all<M: Model>(&self, list: &mut PagedList<M>) -> Result<()> {
        self.rt.block_on(list.drain_all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::mock;

    fn test_client() -> Client {
        Client::from_builder(
            crate::client::Client::builder("token").base_url(mockito::server_url()),
        )
        .unwrap()
    }

    #[test]
    fn get_player_without_an_outer_runtime() {
        let client = test_client();
        let _m = mock("GET", "/players/%23YLQ88")
            .with_body(r##"{"tag": "#YLQ88", "name": "sync rat"}"##)
            .create();

        let player = client.get_player("#YLQ88").unwrap();

        assert_eq!(player.name(), Some("sync rat"));
    }

    #[test]
    fn refresh_and_paging_work_through_the_facade() {
        let client = test_client();

        let _page1 = mock("GET", "/clans?name=rats")
            .with_body(
                r##"{"items": [{"tag": "#A", "name": "rats"}], "paging": {"cursors": {"after": "c2"}}}"##,
            )
            .create();
        let _page2 = mock("GET", "/clans?after=c2&name=rats")
            .with_body(r##"{"items": [{"tag": "#B", "name": "rats 2"}], "paging": {"cursors": {}}}"##)
            .create();

        let mut clans = client
            .search_clans(ClanFilter::default().name("rats"), FetchOptions::default())
            .unwrap();
        client.drain_all(&mut clans).unwrap();

        assert_eq!(clans.len(), 2);

        let _refreshed = mock("GET", "/clans?name=rats")
            .with_body(r##"{"items": [{"tag": "#A", "name": "rats"}], "paging": {"cursors": {}}}"##)
            .create();

        let mut first = clans.items()[0].clone();
        client.refresh(&mut first).unwrap();
    }

    #[test]
    fn validation_errors_surface_synchronously() {
        let client = test_client();

        assert!(matches!(
            client.get_player("#!"),
            Err(Error::Validation(_))
        ));
    }
}
