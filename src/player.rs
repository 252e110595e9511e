use futures::future::BoxFuture;
use reqwest::Method;
use serde_json::json;

use crate::clan::Clan;
use crate::client::{Client, FetchOptions};
use crate::error::Result;
use crate::model::{ClanLinked, Entity, Model, Refreshable};
use crate::tag;

/// A player profile.
///
/// Typed accessors cover the handful of fields every profile has; everything
/// else is reachable through [`entity`][Model::entity] and [`Entity::get`].
#[derive(Debug, Clone)]
pub struct Player {
    entity: Entity,
}

impl Player {
    /// The player's tag, e.g. `#2P0LYQ`.
    pub fn tag(&self) -> Option<&str> {
        self.entity.str_of("tag")
    }

    /// The player's display name.
    pub fn name(&self) -> Option<&str> {
        self.entity.str_of("name")
    }

    /// The player's experience level.
    pub fn exp_level(&self) -> Option<u64> {
        self.entity.u64_of("exp_level")
    }

    /// The player's current trophy count.
    pub fn trophies(&self) -> Option<u64> {
        self.entity.u64_of("trophies")
    }
}

impl Model for Player {
    fn from_entity(entity: Entity) -> Player {
        Player { entity }
    }

    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }
}

impl Refreshable for Player {
    fn refresh(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.entity.refresh())
    }
}

impl ClanLinked for Player {
    fn clan_tag(&self) -> Option<String> {
        self.entity
            .get("clan")?
            .get("tag")?
            .as_str()
            .map(str::to_string)
    }

    fn fetch_clan(&self) -> BoxFuture<'_, Result<Clan>> {
        Box::pin(async move {
            let Some(tag) = self.clan_tag() else {
                return Err(crate::error::Error::Validation(String::from(
                    "player is not in a clan",
                )));
            };
            self.entity.client().get_clan(&tag).await
        })
    }
}

impl Client {
    /// Gets a player's profile by tag. The tag is normalized and validated
    /// before any request is made.
    pub async fn get_player(&self, tag: &str) -> Result<Player> {
        let url = self.endpoint(&format!("/players/{}", tag::normalize(tag)?), &[])?;
        self.get_model(url, Method::GET, None, None).await?.one()
    }

    /// Gets a player's recent battle log.
    pub async fn get_player_battles(
        &self,
        tag: &str,
        options: FetchOptions,
    ) -> Result<Vec<Entity>> {
        let url = self.endpoint(
            &format!("/players/{}/battles", tag::normalize(tag)?),
            &options.to_params(),
        )?;
        self.get_model(url, Method::GET, options.timeout, None)
            .await?
            .many()
    }

    /// Gets a player's upcoming chest cycle.
    pub async fn get_player_chests(&self, tag: &str) -> Result<Entity> {
        let url = self.endpoint(&format!("/players/{}/chests", tag::normalize(tag)?), &[])?;
        self.get_model(url, Method::GET, None, None).await?.one()
    }

    /// Verifies an in-game API token for a player, proving account
    /// ownership. Returns the verification result object.
    pub async fn verify_player_token(&self, tag: &str, token: &str) -> Result<Entity> {
        let url = self.endpoint(
            &format!("/players/{}/verifytoken", tag::normalize(tag)?),
            &[],
        )?;
        self.get_model(url, Method::POST, None, Some(json!({"token": token})))
            .await?
            .one()
    }
}
