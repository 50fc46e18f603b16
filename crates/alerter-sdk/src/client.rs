//! Alerter client for route submission and alert subscription.

use alerter_core::{CorrelationEvent, Point, Route, SimulationResponse, SubmitRouteResponse};
use anyhow::Result;
use futures_util::StreamExt;
use reqwest::Url;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Client for an alerter server.
#[derive(Debug, Clone)]
pub struct AlerterClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Live feed of events from a subscribed channel.
pub struct EventStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl AlerterClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a route; returns its id and length in meters.
    pub async fn submit_route(&self, points: &[Point]) -> Result<SubmitRouteResponse> {
        let url = format!("{}/v1/routes", self.base_url);
        let response = self.client.post(&url).json(points).send().await?;
        let response = check_status(response, "submit route").await?;
        Ok(response.json().await?)
    }

    /// Active routes, newest first.
    pub async fn list_routes(&self) -> Result<Vec<Route>> {
        let url = format!("{}/v1/routes", self.base_url);
        let response = self.client.get(&url).send().await?;
        let response = check_status(response, "list routes").await?;
        Ok(response.json().await?)
    }

    /// Run one server-side simulation window. Resolves when it finishes.
    pub async fn simulate_hazards(&self) -> Result<SimulationResponse> {
        let url = format!("{}/v1/hazards/simulate", self.base_url);
        let response = self.client.post(&url).send().await?;
        let response = check_status(response, "simulate hazards").await?;
        Ok(response.json().await?)
    }

    /// Subscribe to `channel`, optionally only to alerts for one route.
    pub async fn subscribe(&self, channel: &str, route_id: Option<&str>) -> Result<EventStream> {
        let url = build_ws_url(&self.base_url, "/v1/ws", channel, route_id)?;
        let (socket, _) = connect_async(url.as_str()).await?;
        tracing::debug!("Subscribed to '{}' at {}", channel, url);
        Ok(EventStream { socket })
    }
}

async fn check_status(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    anyhow::bail!("Failed to {}: {} ({})", action, detail, status)
}

impl EventStream {
    /// Read the next event (returns None on close).
    pub async fn next_event(&mut self) -> Option<Result<CorrelationEvent>> {
        while let Some(msg) = self.socket.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(err) => return Some(Err(err.into())),
            };
            match msg {
                Message::Text(text) => {
                    return Some(serde_json::from_str(&text).map_err(Into::into));
                }
                Message::Binary(data) => {
                    return Some(serde_json::from_slice(&data).map_err(Into::into));
                }
                Message::Close(_) => return None,
                _ => {}
            }
        }
        None
    }

    pub async fn close(mut self) -> Result<()> {
        self.socket.close(None).await?;
        Ok(())
    }
}

fn build_ws_url(base: &str, path: &str, channel: &str, route_id: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(base)?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => other,
    }
    .to_string();

    url.set_scheme(&scheme)
        .map_err(|_| anyhow::anyhow!("Invalid base URL scheme"))?;
    url.set_path(path);
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("channel", channel);
        if let Some(route_id) = route_id {
            query.append_pair("routeId", route_id);
        }
    }
    Ok(url)
}
