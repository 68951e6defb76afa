//! `MarketplaceApi` over the Vast.ai REST API.

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::application::ports::{MarketplaceApi, OfferQuery, RentSpec};
use crate::domain::instance::{GpuOffer, InstanceListing, MODEL_PORT};

#[derive(Debug, Deserialize)]
struct CurrentUser {
    id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OffersResponse {
    Wrapped { offers: Vec<GpuOffer> },
    Bare(Vec<GpuOffer>),
}

#[derive(Debug, Deserialize)]
struct InstancesResponse {
    #[serde(default)]
    instances: Vec<InstanceListing>,
}

#[derive(Debug, Serialize)]
struct AskRequest<'a> {
    client_id: &'a str,
    image: &'a str,
    disk: u32,
    label: &'a str,
    onstart: &'a str,
    runtype: &'a str,
    bid_price: f64,
    ports: String,
}

#[derive(Debug, Serialize)]
struct KeyBody<'a> {
    ssh_key: &'a str,
}

/// Search filter in the API's `{field: {op: value}}` form.
#[must_use]
pub fn offer_filter(query: &OfferQuery) -> Value {
    json!({
        "rented": {"eq": false},
        "rentable": {"eq": true},
        "disk_space": {"gte": query.min_disk_gb},
        "dph_total": {"lte": query.max_hourly_price},
        "gpu_ram": {"gte": query.min_gpu_ram_mb},
    })
}

/// The contract id is reported under one of several names.
fn contract_id(body: &Value) -> Option<u64> {
    ["new_contract", "id", "instance_id"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_u64))
}

pub struct VastClient {
    http: Client,
    base: String,
    api_key: String,
}

impl VastClient {
    pub fn new(base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base))
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send<T: DeserializeOwned>(&self, method: Method, path: &str, req: RequestBuilder) -> Result<T> {
        let response = req
            .send()
            .await
            .with_context(|| format!("{method} {path}"))?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!("marketplace {method} {path} returned {status}: {text}"));
        }
        serde_json::from_str(&text).with_context(|| format!("parsing {method} {path} response"))
    }

    async fn call<T: DeserializeOwned>(&self, method: Method, path: &str) -> Result<T> {
        let req = self.request(method.clone(), path);
        self.send(method, path, req).await
    }

    async fn call_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let req = self.request(method.clone(), path).json(body);
        self.send(method, path, req).await
    }
}

impl MarketplaceApi for VastClient {
    async fn current_user(&self) -> Result<u64> {
        let user: CurrentUser = self.call(Method::GET, "/users/current/").await?;
        Ok(user.id)
    }

    async fn set_account_key(&self, user_id: u64, public_key: &str) -> Result<()> {
        let _: Value = self
            .call_json(
                Method::PUT,
                &format!("/users/{user_id}/"),
                &KeyBody { ssh_key: public_key },
            )
            .await?;
        Ok(())
    }

    async fn search_offers(&self, query: &OfferQuery) -> Result<Vec<GpuOffer>> {
        let path = "/bundles/";
        let req = self.request(Method::GET, path).query(&[
            ("q", offer_filter(query).to_string()),
            ("order_by", "dph_total".to_string()),
            ("type", "ask".to_string()),
            ("limit", query.limit.to_string()),
        ]);
        let offers = match self.send::<OffersResponse>(Method::GET, path, req).await? {
            OffersResponse::Wrapped { offers } | OffersResponse::Bare(offers) => offers,
        };
        tracing::debug!(count = offers.len(), "offers returned");
        Ok(offers)
    }

    async fn create_instance(&self, offer_id: u64, spec: &RentSpec) -> Result<u64> {
        let path = format!("/asks/{offer_id}/");
        let body = AskRequest {
            client_id: "me",
            image: &spec.image,
            disk: spec.disk_gb,
            label: &spec.label,
            onstart: &spec.onstart,
            runtype: "ssh",
            bid_price: spec.bid_price,
            ports: format!("{MODEL_PORT}/tcp"),
        };
        let data: Value = self.call_json(Method::PUT, &path, &body).await?;
        contract_id(&data).ok_or_else(|| anyhow!("unexpected response from {path}: {data}"))
    }

    async fn list_instances(&self) -> Result<Vec<InstanceListing>> {
        // The per-instance endpoint wants a session; the owner listing takes the key.
        let resp: InstancesResponse = self.call(Method::GET, "/instances/?owner=me").await?;
        Ok(resp.instances)
    }

    async fn attach_key(&self, instance_id: u64, public_key: &str) -> Result<()> {
        let _: Value = self
            .call_json(
                Method::POST,
                &format!("/instances/{instance_id}/ssh/"),
                &KeyBody { ssh_key: public_key },
            )
            .await?;
        Ok(())
    }

    async fn destroy(&self, instance_id: u64) -> Result<()> {
        // An empty JSON body is required for the key to be accepted.
        let _: Value = self
            .call_json(Method::DELETE, &format!("/instances/{instance_id}/"), &json!({}))
            .await?;
        tracing::info!(instance = instance_id, "marketplace instance destroyed");
        Ok(())
    }
}
