//! HTTP transports for the remote product service and user directory.
//!
//! Paths mirror the product service's contract: availability checks and
//! stock adjustments are `PUT`s under `/private`, detail lookups are plain
//! `GET`s by id.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use common::{ProductId, UserId};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::product::{ProductDetails, ProductGateway, StockDelta};
use crate::user::UserDirectory;

/// Wire shape for (product, quantity) pairs.
#[derive(Debug, Serialize)]
struct ProductQuantity {
    id: i64,
    quantity: i64,
}

/// Wire shape of a product detail response.
#[derive(Debug, Deserialize)]
struct ProductRecord {
    id: i64,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    price_cents: Option<i64>,
}

fn transport(err: reqwest::Error) -> ClientError {
    ClientError::Transport(err.to_string())
}

/// Product service transport over HTTP.
pub struct HttpProductGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProductGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ProductGateway for HttpProductGateway {
    async fn check_availability(
        &self,
        wanted: &[(ProductId, u32)],
    ) -> Result<HashMap<ProductId, u32>, ClientError> {
        let body: Vec<ProductQuantity> = wanted
            .iter()
            .map(|(id, quantity)| ProductQuantity {
                id: id.as_i64(),
                quantity: i64::from(*quantity),
            })
            .collect();

        let response = self
            .client
            .put(format!("{}/private", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?;

        let available: HashMap<i64, u32> = response.json().await.map_err(transport)?;
        Ok(available
            .into_iter()
            .map(|(id, quantity)| (ProductId::new(id), quantity))
            .collect())
    }

    async fn adjust_stock(&self, deltas: &[StockDelta]) -> Result<(), ClientError> {
        let body: Vec<ProductQuantity> = deltas
            .iter()
            .map(|delta| ProductQuantity {
                id: delta.product_id.as_i64(),
                quantity: delta.quantity,
            })
            .collect();

        self.client
            .put(format!("{}/private/to-order", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?;
        Ok(())
    }

    async fn product_details(&self, product_id: ProductId) -> Result<ProductDetails, ClientError> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, product_id))
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::ProductNotFound(product_id));
        }
        let record: ProductRecord = response
            .error_for_status()
            .map_err(transport)?
            .json()
            .await
            .map_err(transport)?;

        Ok(ProductDetails {
            id: ProductId::new(record.id),
            name: record.name,
            description: record.description,
            price_cents: record.price_cents,
        })
    }
}

/// User directory transport over HTTP.
pub struct HttpUserDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUserDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn find_user_id(&self, email: &str) -> Result<UserId, ClientError> {
        let response = self
            .client
            .get(format!("{}/email/{}", self.base_url, email))
            .send()
            .await
            .map_err(|e| ClientError::Unavailable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::UserNotFound(email.to_string()));
        }
        let user_id: i64 = response
            .error_for_status()
            .map_err(|e| ClientError::Unavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| ClientError::Unavailable(e.to_string()))?;

        Ok(UserId::new(user_id))
    }
}
