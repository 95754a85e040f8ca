//! HTTP implementation of [`RateApi`].

use async_trait::async_trait;
use ratedesk_common::{CurrencyPair, RateSource};
use ratedesk_rates::{
    RateAck, RateApi, RateResult, RateSnapshot, RateTable, RawRates, RawTable, SetRateRequest,
};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::RateClientConfig;
use crate::error::{ClientError, ClientResult};

const RATES_PATH: &str = "exchange-rates";

/// REST client for the rate aggregation service.
#[derive(Debug, Clone)]
pub struct HttpRateApi {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpRateApi {
    /// Create a client from configuration.
    pub fn new(config: &RateClientConfig) -> ClientResult<Self> {
        let base_url =
            Url::parse(&config.api_url).map_err(|e| ClientError::Config(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "{} cannot be a base URL",
                config.api_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        Ok(Self { base_url, client })
    }

    /// URL for the given path segments. Each segment is percent-encoded, so a
    /// pair value like `RUB/USD` becomes `RUB%2FUSD`.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> ClientResult<T> {
        let url = self.endpoint(segments);
        debug!(url = %url, "GET");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl RateApi for HttpRateApi {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self))]
    async fn fetch_pairs(&self) -> RateResult<Vec<CurrencyPair>> {
        Ok(self.get_json(&[RATES_PATH, "pairs"]).await?)
    }

    #[instrument(skip(self))]
    async fn fetch_sources(&self) -> RateResult<Vec<RateSource>> {
        Ok(self.get_json(&[RATES_PATH, "sources"]).await?)
    }

    #[instrument(skip(self))]
    async fn fetch_pair_rates(&self, pair: &str) -> RateResult<RateSnapshot> {
        let raw: RawRates = self.get_json(&[RATES_PATH, pair]).await?;
        let snapshot = RateSnapshot::from_raw(&raw);
        if snapshot.len() < raw.len() {
            warn!(
                pair = %pair,
                dropped = raw.len() - snapshot.len(),
                "Dropped unusable rate values"
            );
        }
        Ok(snapshot)
    }

    #[instrument(skip(self))]
    async fn fetch_all_rates(&self) -> RateResult<RateTable> {
        let raw: RawTable = self.get_json(&[RATES_PATH]).await?;
        Ok(RateTable::from_raw(&raw))
    }

    #[instrument(skip(self), fields(pair = %request.pair, source = %request.source))]
    async fn set_rate(&self, request: &SetRateRequest) -> RateResult<RateAck> {
        let url = self.endpoint(&[RATES_PATH, "set-rate"]);
        let response = self
            .client
            .post(url.clone())
            .json(request)
            .send()
            .await
            .map_err(ClientError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        let body = response.text().await.map_err(ClientError::from)?;
        if body.trim().is_empty() {
            return Ok(RateAck::default());
        }
        // Any 2xx counts as accepted, even with an unexpected body.
        Ok(serde_json::from_str(&body).unwrap_or_else(|err| {
            debug!(error = %err, "Unrecognized set-rate acknowledgement");
            RateAck::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP server answering from a route table. Records request lines.
    async fn serve(routes: Vec<(&'static str, u16, &'static str)>) -> (String, Arc<parking_lot::Mutex<Vec<String>>>) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let routes = routes.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    let head_end = loop {
                        let n = stream.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                            break pos + 4;
                        }
                    };
                    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
                    let content_length = head
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    while buf.len() < head_end + content_length {
                        let n = stream.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                    }

                    let request_line = head.lines().next().unwrap_or_default().to_string();
                    log.lock().push(request_line.clone());
                    let path = request_line.split(' ').nth(1).unwrap_or("/");

                    let (status, body) = routes
                        .iter()
                        .find(|(route, _, _)| *route == path)
                        .map(|(_, status, body)| (*status, *body))
                        .unwrap_or((404, ""));
                    let response = format!(
                        "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        (format!("http://{addr}"), seen)
    }

    fn api(base: &str) -> HttpRateApi {
        let config = RateClientConfig {
            api_url: base.to_string(),
            ..Default::default()
        };
        HttpRateApi::new(&config).unwrap()
    }

    #[test]
    fn test_pair_is_percent_encoded() {
        let api = api("http://rates.local/api");
        assert_eq!(
            api.endpoint(&[RATES_PATH, "RUB/USD"]).as_str(),
            "http://rates.local/api/exchange-rates/RUB%2FUSD"
        );
        assert_eq!(
            api.endpoint(&[RATES_PATH]).as_str(),
            "http://rates.local/api/exchange-rates"
        );
    }

    #[tokio::test]
    async fn test_fetches_catalog_and_rates() {
        let (base, seen) = serve(vec![
            (
                "/exchange-rates/pairs",
                200,
                r#"[{"value":"RUB/USD","label":"RUB / USD"}]"#,
            ),
            (
                "/exchange-rates/sources",
                200,
                r#"[{"code":"CBR","name":"Central Bank"}]"#,
            ),
            (
                "/exchange-rates/RUB%2FUSD",
                200,
                r#"{"CBR":90.5,"PF":null,"XX":-1}"#,
            ),
            (
                "/exchange-rates",
                200,
                r#"{"RUB/USD":{"CBR":90.5},"USDT/RUB":{"PF":95}}"#,
            ),
        ])
        .await;
        let api = api(&base);

        let pairs = api.fetch_pairs().await.unwrap();
        assert_eq!(pairs[0].value, "RUB/USD");

        let sources = api.fetch_sources().await.unwrap();
        assert_eq!(sources[0].code, "CBR");

        let snapshot = api.fetch_pair_rates("RUB/USD").await.unwrap();
        assert_eq!(snapshot.get("CBR"), Some(dec!(90.5)));
        assert_eq!(snapshot.len(), 1);

        let table = api.fetch_all_rates().await.unwrap();
        assert_eq!(table.len(), 2);

        assert!(seen
            .lock()
            .iter()
            .any(|line| line.starts_with("GET /exchange-rates/RUB%2FUSD ")));
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let (base, _) = serve(vec![("/exchange-rates/pairs", 500, "oops")]).await;
        let err = api(&base).fetch_pairs().await.unwrap_err();
        assert!(err.to_string().contains("HTTP 500"), "{err}");
    }

    #[tokio::test]
    async fn test_set_rate_accepts_any_success_body() {
        let (base, seen) = serve(vec![("/exchange-rates/set-rate", 201, "")]).await;
        let request = SetRateRequest {
            pair: "RUB/USD".into(),
            source: "CBR".into(),
            rate: dec!(91.25),
        };

        let ack = api(&base).set_rate(&request).await.unwrap();
        assert_eq!(ack, RateAck::default());
        assert_eq!(seen.lock()[0], "POST /exchange-rates/set-rate HTTP/1.1");
    }
}
