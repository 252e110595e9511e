use futures::future::BoxFuture;
use reqwest::Method;

use crate::client::{Client, FetchOptions};
use crate::error::{Error, Result};
use crate::model::{Entity, Model, Refreshable};
use crate::paging::PagedList;
use crate::tag;

/// An open tournament.
#[derive(Debug, Clone)]
pub struct Tournament {
    entity: Entity,
}

impl Tournament {
    /// The tournament's tag.
    pub fn tag(&self) -> Option<&str> {
        self.entity.str_of("tag")
    }

    /// The tournament's display name.
    pub fn name(&self) -> Option<&str> {
        self.entity.str_of("name")
    }

    /// Current status (inPreparation, inProgress, ended).
    pub fn status(&self) -> Option<&str> {
        self.entity.str_of("status")
    }

    /// Maximum number of participants.
    pub fn capacity(&self) -> Option<u64> {
        self.entity.u64_of("max_capacity")
    }
}

impl Model for Tournament {
    fn from_entity(entity: Entity) -> Tournament {
        Tournament { entity }
    }

    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }
}

impl Refreshable for Tournament {
    fn refresh(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.entity.refresh())
    }
}

impl Client {
    /// Gets a tournament by tag.
    pub async fn get_tournament(&self, tag: &str) -> Result<Tournament> {
        let url = self.endpoint(&format!("/tournaments/{}", tag::normalize(tag)?), &[])?;
        self.get_model(url, Method::GET, None, None).await?.one()
    }

    /// Searches open tournaments by name. The name must be at least three
    /// characters long; that is checked locally.
    pub async fn search_tournaments(
        &self,
        name: &str,
        options: FetchOptions,
    ) -> Result<PagedList<Tournament>> {
        if name.chars().count() < 3 {
            return Err(Error::Validation(String::from(
                "tournament name filter must be at least 3 characters long",
            )));
        }

        let mut params = vec![("name", name.to_string())];
        params.extend(options.to_params());

        let url = self.endpoint("/tournaments", &params)?;
        self.get_model(url, Method::GET, options.timeout, None)
            .await?
            .paged()
    }
}
