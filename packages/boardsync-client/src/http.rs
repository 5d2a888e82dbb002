//! `BoardApi` over the ticket store's REST endpoints.
use std::time::Duration;

use boardsync_core::types::PositionBatch;
use boardsync_core::{
    ApiError, BoardApi, BoardQuery, CardId, ColumnDef, ErrorEnvelope, Page, PositionUpdate,
};
use serde::de::DeserializeOwned;

use crate::error::ClientError;

pub struct HttpBoardApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBoardApi {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = server_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidUrl(server_url.to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }
}

/// Query string for one page of a board fetch.
fn page_params(query: &BoardQuery, page: u32, per_page: u32) -> Vec<(&'static str, String)> {
    let mut params = query.to_params();
    params.push(("page", page.to_string()));
    params.push(("per_page", per_page.to_string()));
    params
}

fn transport(e: reqwest::Error) -> ApiError {
    ApiError::Transport(e.to_string())
}

/// Pass successful responses through; turn anything else into the
/// store's error envelope.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let envelope = ErrorEnvelope::from_body(status.as_u16(), &body);
    log::warn!(
        "[boardsync.http] {} {}: {}{}",
        status.as_u16(),
        envelope.code,
        envelope.message,
        envelope
            .request_id
            .as_deref()
            .map(|id| format!(" (request {})", id))
            .unwrap_or_default()
    );
    Err(ApiError::Rejected {
        status: status.as_u16(),
        envelope,
    })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    check(response)
        .await?
        .json::<T>()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}

impl BoardApi for HttpBoardApi {
    async fn fetch_page(
        &self,
        query: &BoardQuery,
        page: u32,
        per_page: u32,
    ) -> Result<Page, ApiError> {
        let response = self
            .client
            .get(self.url("tarjetas"))
            .query(&page_params(query, page, per_page))
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn put_positions(&self, items: &[PositionUpdate]) -> Result<(), ApiError> {
        let body = PositionBatch {
            items: items.to_vec(),
        };
        let response = self
            .client
            .put(self.url("tarjetas/batch/positions"))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        check(response).await.map(|_| ())
    }

    async fn delete_card(&self, card_id: CardId) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url(&format!("tarjetas/{}", card_id)))
            .send()
            .await
            .map_err(transport)?;
        check(response).await.map(|_| ())
    }

    async fn fetch_columns(&self) -> Result<Vec<ColumnDef>, ApiError> {
        let response = self
            .client
            .get(self.url("columnas"))
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }
}
