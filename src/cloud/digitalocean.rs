//! DigitalOcean v2 REST implementation of [`CloudApi`].

use std::net::Ipv4Addr;
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::header::USER_AGENT;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    ActionId, ActionStatus, CloudApi, CloudError, CloudFuture, CreateDroplet, CreatedDroplet,
    Droplet, DropletId,
};
use crate::config::{ConfigError, ProviderConfig};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: u32 = 200;

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Client for the DigitalOcean droplet and action endpoints.
#[derive(Clone)]
pub struct DigitalOceanApi {
    base: String,
    token: String,
    user_agent: String,
}

impl std::fmt::Debug for DigitalOceanApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigitalOceanApi")
            .field("base", &self.base)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl DigitalOceanApi {
    /// Builds a client from validated provider configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration is incomplete.
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            base: config.api_base.trim().trim_end_matches('/').to_owned(),
            token: config.api_key.trim().to_owned(),
            user_agent: format!(
                "dropship/{} ({})",
                env!("CARGO_PKG_VERSION"),
                config.client_id.trim()
            ),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn execute(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<u8>, CloudError> {
        let response = request
            .bearer_auth(&self.token)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|err| CloudError::Http {
                endpoint: endpoint.to_owned(),
                message: err.to_string(),
            })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|err| CloudError::Http {
            endpoint: endpoint.to_owned(),
            message: err.to_string(),
        })?;

        if status.is_success() {
            return Ok(body.to_vec());
        }

        Err(CloudError::Api {
            endpoint: endpoint.to_owned(),
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str, url: &str) -> Result<T, CloudError> {
        let body = self.execute(endpoint, HTTP_CLIENT.get(url)).await?;
        decode(endpoint, &body)
    }
}

impl CloudApi for DigitalOceanApi {
    fn create_droplet<'a>(&'a self, request: &'a CreateDroplet) -> CloudFuture<'a, CreatedDroplet> {
        Box::pin(async move {
            let endpoint = "/droplets";
            let payload = CreateBody {
                name: &request.name,
                region: &request.region,
                size: &request.size,
                image: ImageRef::parse(&request.image),
                ssh_keys: &request.ssh_keys,
                private_networking: request.private_networking,
            };
            let body = self
                .execute(endpoint, HTTP_CLIENT.post(self.url(endpoint)).json(&payload))
                .await?;
            parse_created(endpoint, &body)
        })
    }

    fn get_droplet(&self, id: DropletId) -> CloudFuture<'_, Droplet> {
        Box::pin(async move {
            let endpoint = format!("/droplets/{id}");
            let body = self
                .execute(&endpoint, HTTP_CLIENT.get(self.url(&endpoint)))
                .await?;
            parse_droplet(&endpoint, &body)
        })
    }

    fn list_droplets(&self) -> CloudFuture<'_, Vec<Droplet>> {
        Box::pin(async move {
            let endpoint = "/droplets";
            let mut droplets = Vec::new();
            let mut next = Some(self.url(&format!("{endpoint}?page=1&per_page={PAGE_SIZE}")));
            while let Some(url) = next {
                let page: DropletPage = self.get_json(endpoint, &url).await?;
                debug!(count = page.droplets.len(), "fetched droplet page");
                droplets.extend(page.droplets.into_iter().map(WireDroplet::into_droplet));
                next = page.links.pages.and_then(|pages| pages.next);
            }
            Ok(droplets)
        })
    }

    fn destroy_droplet(&self, id: DropletId) -> CloudFuture<'_, ()> {
        Box::pin(async move {
            let endpoint = format!("/droplets/{id}");
            self.execute(&endpoint, HTTP_CLIENT.delete(self.url(&endpoint)))
                .await
                .map(|_| ())
        })
    }

    fn get_action(&self, id: ActionId) -> CloudFuture<'_, ActionStatus> {
        Box::pin(async move {
            let endpoint = format!("/actions/{id}");
            let envelope: ActionEnvelope = self.get_json(&endpoint, &self.url(&endpoint)).await?;
            Ok(ActionStatus::from_wire(&envelope.action.status))
        })
    }
}

#[derive(Serialize)]
struct CreateBody<'a> {
    name: &'a str,
    region: &'a str,
    size: &'a str,
    image: ImageRef<'a>,
    ssh_keys: &'a [String],
    private_networking: bool,
}

/// Public images are addressed by slug, private snapshots by numeric id.
#[derive(Serialize)]
#[serde(untagged)]
enum ImageRef<'a> {
    Id(u64),
    Slug(&'a str),
}

impl<'a> ImageRef<'a> {
    fn parse(value: &'a str) -> Self {
        value.parse().map_or(Self::Slug(value), Self::Id)
    }
}

#[derive(Deserialize)]
struct WireDroplet {
    id: u64,
    name: String,
    #[serde(default)]
    locked: bool,
    #[serde(default)]
    status: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    size_slug: String,
    #[serde(default)]
    image: WireImage,
    #[serde(default)]
    region: WireRegion,
    #[serde(default)]
    networks: WireNetworks,
}

#[derive(Default, Deserialize)]
struct WireImage {
    id: Option<u64>,
    slug: Option<String>,
}

#[derive(Default, Deserialize)]
struct WireRegion {
    #[serde(default)]
    slug: String,
}

#[derive(Default, Deserialize)]
struct WireNetworks {
    #[serde(default)]
    v4: Vec<WireAddress>,
}

#[derive(Deserialize)]
struct WireAddress {
    ip_address: String,
    #[serde(rename = "type")]
    kind: String,
}

impl WireDroplet {
    fn into_droplet(self) -> Droplet {
        let address = |kind: &str| {
            self.networks
                .v4
                .iter()
                .filter(|net| net.kind == kind)
                .find_map(|net| net.ip_address.parse::<Ipv4Addr>().ok())
        };
        let public_ipv4 = address("public");
        let private_ipv4 = address("private");
        let image = self
            .image
            .slug
            .clone()
            .or_else(|| self.image.id.map(|id| id.to_string()))
            .unwrap_or_default();

        Droplet {
            id: DropletId::new(self.id),
            name: self.name,
            size: self.size_slug,
            image,
            region: self.region.slug,
            public_ipv4,
            private_ipv4,
            locked: self.locked,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

#[derive(Deserialize)]
struct DropletEnvelope {
    droplet: WireDroplet,
}

#[derive(Deserialize)]
struct CreateEnvelope {
    droplet: WireDroplet,
    #[serde(default)]
    links: CreateLinks,
}

#[derive(Default, Deserialize)]
struct CreateLinks {
    #[serde(default)]
    actions: Vec<ActionLink>,
}

#[derive(Deserialize)]
struct ActionLink {
    id: u64,
    #[serde(default)]
    rel: String,
}

#[derive(Deserialize)]
struct DropletPage {
    droplets: Vec<WireDroplet>,
    #[serde(default)]
    links: PageLinks,
}

#[derive(Default, Deserialize)]
struct PageLinks {
    pages: Option<Pages>,
}

#[derive(Deserialize)]
struct Pages {
    next: Option<String>,
}

#[derive(Deserialize)]
struct ActionEnvelope {
    action: WireAction,
}

#[derive(Deserialize)]
struct WireAction {
    status: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: &[u8]) -> Result<T, CloudError> {
    serde_json::from_slice(body).map_err(|err| CloudError::Decode {
        endpoint: endpoint.to_owned(),
        message: err.to_string(),
    })
}

pub(super) fn parse_droplet(endpoint: &str, body: &[u8]) -> Result<Droplet, CloudError> {
    let envelope: DropletEnvelope = decode(endpoint, body)?;
    Ok(envelope.droplet.into_droplet())
}

pub(super) fn parse_created(endpoint: &str, body: &[u8]) -> Result<CreatedDroplet, CloudError> {
    let envelope: CreateEnvelope = decode(endpoint, body)?;
    let action = envelope
        .links
        .actions
        .iter()
        .find(|link| link.rel == "create")
        .or_else(|| envelope.links.actions.first())
        .map(|link| ActionId::new(link.id));

    Ok(CreatedDroplet {
        droplet: envelope.droplet.into_droplet(),
        action,
    })
}

pub(super) fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ApiErrorBody>(body).map_or_else(
        |_| String::from_utf8_lossy(body).trim().to_owned(),
        |parsed| parsed.message,
    )
}
