//! # Tado smart thermostat client
//!
//! Reads the current and target temperature of every heating zone.
//!
//! ## Authentication
//! Tado uses the OAuth 2.0 device authorization grant:
//! 1. Without a stored refresh token the client asks for a device code and the
//!    fetch fails with [`FetchError::Activation`], carrying the verification
//!    URL. The panel keeps showing it until the user opens the URL and logs in.
//! 2. Every later fetch polls the token endpoint once. When the user has
//!    confirmed, the tokens arrive and the refresh token is written to the
//!    token file.
//! 3. After that, access tokens are renewed with the refresh token, including
//!    across restarts.
//!
//! The token file is a tiny JSON document (`{"refresh_token": "..."}`).

use crate::config::Config;
use crate::fetch::{http_client, FetchError, FetchOutcome, Fetcher};
use crate::source::SourceData;
use crate::ZoneReading;
use log::{debug, info, warn};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::Mutex;

const AUTH_URL: &str = "https://login.tado.com/oauth2";
const API_URL: &str = "https://my.tado.com/api/v2";

/// Public client id of Tado's own device-flow clients
const CLIENT_ID: &str = "1bb50063-6b0c-4d11-bd99-387f4a91cc46";

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Renew access tokens this long before they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct DeviceAuthorization {
    device_code: String,
    verification_uri_complete: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TokenGrant {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct OAuthError {
    error: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct Me {
    homes: Vec<Home>,
}

#[derive(Debug, Deserialize)]
struct Home {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ZoneStates {
    #[serde(rename = "zoneStates")]
    zone_states: HashMap<String, ZoneState>,
}

#[derive(Debug, Deserialize)]
struct ZoneState {
    setting: Option<Setting>,
    #[serde(rename = "sensorDataPoints")]
    sensor_data_points: Option<SensorDataPoints>,
}

#[derive(Debug, Deserialize)]
struct Setting {
    temperature: Option<Celsius>,
}

#[derive(Debug, Deserialize)]
struct SensorDataPoints {
    #[serde(rename = "insideTemperature")]
    inside_temperature: Option<Celsius>,
}

#[derive(Debug, Deserialize)]
struct Celsius {
    celsius: Option<f32>,
}

/// What the token endpoint said about a device-code or refresh request
#[derive(Debug)]
enum TokenReply {
    Granted(TokenGrant),
    /// User has not confirmed yet
    Pending,
    /// Device code expired; start over
    Expired,
    Rejected(String),
}

fn classify_token_reply(status: StatusCode, body: &str) -> Result<TokenReply, FetchError> {
    if status.is_success() {
        return Ok(TokenReply::Granted(serde_json::from_str(body)?));
    }
    let error: OAuthError = serde_json::from_str(body)?;
    Ok(match error.error.as_str() {
        "authorization_pending" | "slow_down" => TokenReply::Pending,
        "expired_token" => TokenReply::Expired,
        other => TokenReply::Rejected(other.to_string()),
    })
}

/// Zone readings sorted by zone id, hidden zones removed.
///
/// A state whose zone is missing from `zones_json` is shown as "undefined".
pub fn decode_zones(
    zones_json: &str,
    states_json: &str,
    hidden: &[String],
) -> Result<Vec<ZoneReading>, FetchError> {
    let zones: Vec<Zone> = serde_json::from_str(zones_json)?;
    let states: ZoneStates = serde_json::from_str(states_json)?;

    let mut entries: Vec<(u64, ZoneState)> = states
        .zone_states
        .into_iter()
        .map(|(id, state)| {
            id.parse::<u64>()
                .map(|id| (id, state))
                .map_err(|_| FetchError::Payload(format!("zone id {id:?} is not a number")))
        })
        .collect::<Result<_, _>>()?;
    entries.sort_by_key(|(id, _)| *id);

    let readings = entries
        .into_iter()
        .map(|(id, state)| {
            let name = match zones.iter().find(|z| z.id == id) {
                Some(zone) => zone.name.clone(),
                None => {
                    warn!("Zone {} has a state but no zone entry", id);
                    "undefined".to_string()
                }
            };
            ZoneReading {
                name,
                current_c: state
                    .sensor_data_points
                    .and_then(|p| p.inside_temperature)
                    .and_then(|t| t.celsius),
                // No target temperature while heating is off
                target_c: state
                    .setting
                    .and_then(|s| s.temperature)
                    .and_then(|t| t.celsius),
            }
        })
        .filter(|zone| !hidden.contains(&zone.name))
        .collect();

    Ok(readings)
}

/// Load the refresh token saved by an earlier run
fn load_token(path: &Path) -> Result<String, io::Error> {
    let data = fs::read(path)?;
    let stored: StoredToken = serde_json::from_slice(&data)?;
    Ok(stored.refresh_token)
}

/// Persist the refresh token so a restart does not need a new activation
fn save_token(path: &Path, refresh_token: &str) -> Result<(), io::Error> {
    let data = serde_json::to_vec(&StoredToken {
        refresh_token: refresh_token.to_string(),
    })?;
    fs::write(path, data)?;
    Ok(())
}

#[derive(Debug)]
enum Auth {
    /// Nothing in memory; the token file may still have a refresh token
    Unlinked,
    /// Waiting for the user to confirm the device
    Pending { device_code: String, url: String },
    Linked {
        access_token: String,
        refresh_token: String,
        expires_at: Instant,
    },
}

#[derive(Debug)]
struct Session {
    auth: Auth,
    home_id: Option<u64>,
}

/// Tado as a data source
pub struct TadoFetcher {
    client: reqwest::Client,
    runtime: Handle,
    token_file: PathBuf,
    hidden_zones: Vec<String>,
    session: Mutex<Session>,
}

impl TadoFetcher {
    pub fn new(runtime: Handle, config: &Config) -> Result<Self, FetchError> {
        Ok(TadoFetcher {
            client: http_client(&config.weather.user_agent)?,
            runtime,
            token_file: config.thermostat.token_file.clone(),
            hidden_zones: config.thermostat.hidden_zones.clone(),
            session: Mutex::new(Session {
                auth: Auth::Unlinked,
                home_id: None,
            }),
        })
    }

    async fn post_token(&self, form: &[(&str, &str)]) -> Result<TokenReply, FetchError> {
        let response = self
            .client
            .post(format!("{AUTH_URL}/token"))
            .form(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        classify_token_reply(status, &body)
    }

    async fn start_device_flow(&self, session: &mut Session) -> FetchError {
        let request = self
            .client
            .post(format!("{AUTH_URL}/device_authorize"))
            .form(&[("client_id", CLIENT_ID), ("scope", "offline_access")])
            .send()
            .await;

        let authorization = match request.and_then(|r| r.error_for_status()) {
            Ok(response) => match response.json::<DeviceAuthorization>().await {
                Ok(authorization) => authorization,
                Err(e) => return e.into(),
            },
            Err(e) => return e.into(),
        };

        info!(
            "Tado needs activation: open {}",
            authorization.verification_uri_complete
        );
        let url = authorization.verification_uri_complete.clone();
        session.auth = Auth::Pending {
            device_code: authorization.device_code,
            url: url.clone(),
        };
        FetchError::Activation { url }
    }

    fn link(&self, session: &mut Session, grant: TokenGrant) -> String {
        if let Err(e) = save_token(&self.token_file, &grant.refresh_token) {
            warn!(
                "Could not save Tado token to {}: {}",
                self.token_file.display(),
                e
            );
        }
        let access_token = grant.access_token.clone();
        session.auth = Auth::Linked {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: Instant::now() + Duration::from_secs(grant.expires_in),
        };
        access_token
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenReply, FetchError> {
        self.post_token(&[
            ("client_id", CLIENT_ID),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    /// A valid access token, or the reason there is none.
    async fn access_token(&self, session: &mut Session) -> Result<String, FetchError> {
        match &session.auth {
            Auth::Linked {
                access_token,
                expires_at,
                ..
            } if Instant::now() + EXPIRY_MARGIN < *expires_at => Ok(access_token.clone()),

            Auth::Linked { refresh_token, .. } => {
                let refresh_token = refresh_token.clone();
                match self.refresh(&refresh_token).await? {
                    TokenReply::Granted(grant) => Ok(self.link(session, grant)),
                    other => {
                        warn!("Tado token refresh failed: {:?}", other);
                        session.auth = Auth::Unlinked;
                        Err(self.start_device_flow(session).await)
                    }
                }
            }

            Auth::Unlinked => {
                if let Ok(stored) = load_token(&self.token_file) {
                    debug!("Using Tado refresh token from {}", self.token_file.display());
                    if let TokenReply::Granted(grant) = self.refresh(&stored).await? {
                        return Ok(self.link(session, grant));
                    }
                    warn!("Stored Tado token was rejected, activating again");
                }
                Err(self.start_device_flow(session).await)
            }

            Auth::Pending { device_code, url } => {
                let (device_code, url) = (device_code.clone(), url.clone());
                let reply = self
                    .post_token(&[
                        ("client_id", CLIENT_ID),
                        ("device_code", device_code.as_str()),
                        ("grant_type", DEVICE_CODE_GRANT),
                    ])
                    .await?;
                match reply {
                    TokenReply::Granted(grant) => {
                        info!("Tado device activated");
                        Ok(self.link(session, grant))
                    }
                    TokenReply::Pending => Err(FetchError::Activation { url }),
                    TokenReply::Expired => Err(self.start_device_flow(session).await),
                    TokenReply::Rejected(reason) => {
                        session.auth = Auth::Unlinked;
                        Err(FetchError::Payload(format!("Tado login rejected: {reason}")))
                    }
                }
            }
        }
    }

    async fn get(&self, token: &str, path: &str) -> Result<String, FetchError> {
        let body = self
            .client
            .get(format!("{API_URL}{path}"))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }

    async fn download(&self) -> Result<Vec<ZoneReading>, FetchError> {
        // Held across the HTTP calls; a panicked fetch leaves it unlocked
        let mut session = self.session.lock().await;
        let token = self.access_token(&mut session).await?;

        let home_id = match session.home_id {
            Some(id) => id,
            None => {
                let me: Me = serde_json::from_str(&self.get(&token, "/me").await?)?;
                let id = me
                    .homes
                    .first()
                    .map(|home| home.id)
                    .ok_or_else(|| FetchError::Payload("Tado account has no home".into()))?;
                session.home_id = Some(id);
                id
            }
        };

        let zones = self.get(&token, &format!("/homes/{home_id}/zones")).await?;
        let states = self
            .get(&token, &format!("/homes/{home_id}/zoneStates"))
            .await?;
        decode_zones(&zones, &states, &self.hidden_zones)
    }
}

impl Fetcher for TadoFetcher {
    fn fetch(&self) -> FetchOutcome {
        let zones = self.runtime.block_on(self.download())?;
        Ok(SourceData::Thermostat(zones))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONES: &str = r#"[
        {"id": 1, "name": "Nappali", "type": "HEATING"},
        {"id": 3, "name": "Közlekedő", "type": "HEATING"},
        {"id": 12, "name": "Háló", "type": "HEATING"}
    ]"#;

    const STATES: &str = r#"{"zoneStates": {
        "12": {
            "setting": {"type": "HEATING", "power": "OFF", "temperature": null},
            "sensorDataPoints": {"insideTemperature": {"celsius": 19.46}}
        },
        "3": {
            "setting": {"type": "HEATING", "power": "ON", "temperature": {"celsius": 18.0}},
            "sensorDataPoints": {"insideTemperature": {"celsius": 18.2}}
        },
        "1": {
            "setting": {"type": "HEATING", "power": "ON", "temperature": {"celsius": 21.5}},
            "sensorDataPoints": {"insideTemperature": {"celsius": 20.91}}
        },
        "7": {
            "setting": {"type": "HEATING", "power": "ON", "temperature": {"celsius": 20.0}},
            "sensorDataPoints": {}
        }
    }}"#;

    fn hidden() -> Vec<String> {
        vec!["Közlekedő".to_string()]
    }

    #[test]
    fn test_zones_sorted_and_filtered() {
        let zones = decode_zones(ZONES, STATES, &hidden()).unwrap();
        let names: Vec<&str> = zones.iter().map(|z| z.name.as_str()).collect();
        assert_eq!(names, vec!["Nappali", "undefined", "Háló"]);

        assert_eq!(zones[0].current_c, Some(20.91));
        assert_eq!(zones[0].target_c, Some(21.5));
        // Heating off
        assert_eq!(zones[2].target_c, None);
        // No inside temperature reported
        assert_eq!(zones[1].current_c, None);
    }

    #[test]
    fn test_bad_zone_id_is_payload_error() {
        let states = r#"{"zoneStates": {"living": {"setting": null}}}"#;
        assert!(matches!(
            decode_zones(ZONES, states, &hidden()),
            Err(FetchError::Payload(_))
        ));
    }

    #[test]
    fn test_token_replies() {
        let granted = classify_token_reply(
            StatusCode::OK,
            r#"{"access_token":"a","refresh_token":"r","expires_in":600,"token_type":"Bearer"}"#,
        )
        .unwrap();
        assert!(matches!(granted, TokenReply::Granted(ref g) if g.refresh_token == "r"));

        let pending =
            classify_token_reply(StatusCode::BAD_REQUEST, r#"{"error":"authorization_pending"}"#)
                .unwrap();
        assert!(matches!(pending, TokenReply::Pending));

        let expired =
            classify_token_reply(StatusCode::BAD_REQUEST, r#"{"error":"expired_token"}"#).unwrap();
        assert!(matches!(expired, TokenReply::Expired));

        let rejected =
            classify_token_reply(StatusCode::BAD_REQUEST, r#"{"error":"invalid_grant"}"#).unwrap();
        assert!(matches!(rejected, TokenReply::Rejected(ref r) if r == "invalid_grant"));

        assert!(classify_token_reply(StatusCode::BAD_GATEWAY, "<html>").is_err());
    }

    #[test]
    fn test_token_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tado-token.json");

        assert!(load_token(&path).is_err());
        save_token(&path, "refresh-me").unwrap();
        assert_eq!(load_token(&path).unwrap(), "refresh-me");
    }

    #[test]
    fn test_activation_error_shows_url() {
        let err = FetchError::Activation {
            url: "https://login.tado.com/oauth2/device?user_code=ABC123".into(),
        };
        let message = crate::source::wrap_error(&format!(":( tado: {err}"), 40);
        assert!(message.lines().count() > 1);
        assert_eq!(message.replace('\n', "").matches("ABC123").count(), 1);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_download_can_move_between_threads() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let fetcher = TadoFetcher::new(rt.handle().clone(), &Config::default()).unwrap();
        // Never polled; the session guard must not pin it to one thread
        let download = fetcher.download();
        assert_send(&download);
    }
}
