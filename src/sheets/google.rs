use super::{a1_range, SheetsBackend, SpreadsheetInfo, WorksheetInfo};
use crate::config::SheetsConfig;
use crate::error::UploadError;
use crate::excel::col_index_to_letter;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::debug;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets/";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Columns blanked by `clear_rows` (A..ZZ).
const CLEAR_COLUMNS: u32 = 702;

/// Fields of a service-account key file that the token exchange needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Clone)]
enum Credentials {
    /// Pre-minted OAuth token from the environment.
    Token(String),
    ServiceAccount(ServiceAccountKey),
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct SpreadsheetResponse {
    properties: SpreadsheetProperties,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SpreadsheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    title: String,
    #[serde(default)]
    grid_properties: Option<GridProperties>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: u32,
    #[serde(default)]
    column_count: u32,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Google Sheets v4 REST client (blocking).
pub struct GoogleSheetsClient {
    http: Client,
    spreadsheet_id: String,
    credentials: Credentials,
    token: Option<(String, Instant)>,
}

impl GoogleSheetsClient {
    pub fn from_config(config: &SheetsConfig, timeout: Duration) -> Result<Self, UploadError> {
        let spreadsheet_id = config
            .spreadsheet_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| UploadError::Auth("spreadsheet id is not set".to_string()))?;

        let credentials = match &config.access_token {
            Some(token) => Credentials::Token(token.clone()),
            None => {
                let path = &config.credentials_file;
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    UploadError::Auth(format!("could not read credentials {}: {}", path.display(), e))
                })?;
                let key: ServiceAccountKey = serde_json::from_str(&raw).map_err(|e| {
                    UploadError::Auth(format!("invalid service account file {}: {}", path.display(), e))
                })?;
                Credentials::ServiceAccount(key)
            }
        };

        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            spreadsheet_id,
            credentials,
            token: None,
        })
    }

    fn access_token(&mut self) -> Result<String, UploadError> {
        let key = match &self.credentials {
            Credentials::Token(t) => return Ok(t.clone()),
            Credentials::ServiceAccount(key) => key.clone(),
        };
        if let Some((token, expires)) = &self.token {
            if Instant::now() < *expires {
                return Ok(token.clone());
            }
        }

        let token_uri = key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &key.client_email,
            scope: SCOPE,
            aud: token_uri,
            iat: now,
            exp: now + 3600,
        };
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| UploadError::Auth(format!("invalid private key: {}", e)))?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
            .map_err(|e| UploadError::Auth(format!("could not sign token request: {}", e)))?;

        let resp = self
            .http
            .post(token_uri)
            .form(&[("grant_type", JWT_GRANT), ("assertion", assertion.as_str())])
            .send()?;
        let resp = check_status(resp)?;
        let body: TokenResponse = resp.json()?;
        // refresh a minute early
        let lifetime = body.expires_in.unwrap_or(3600).saturating_sub(60);
        self.token = Some((body.access_token.clone(), Instant::now() + Duration::from_secs(lifetime)));
        debug!(account = %key.client_email, "obtained access token");
        Ok(body.access_token)
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, UploadError> {
        let mut url = Url::parse(SHEETS_API).map_err(|e| UploadError::InvalidResponse(e.to_string()))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| UploadError::InvalidResponse("bad API base url".to_string()))?;
            path.pop_if_empty();
            for s in segments {
                path.push(s);
            }
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn send(&mut self, request: RequestBuilder) -> Result<Response, UploadError> {
        let token = self.access_token()?;
        let resp = request.bearer_auth(token).send()?;
        check_status(resp)
    }
}

fn check_status(resp: Response) -> Result<Response, UploadError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(status_error(status.as_u16(), body))
}

/// Maps a failed response onto the retry classes the uploader understands.
fn status_error(code: u16, body: String) -> UploadError {
    match code {
        429 => UploadError::RateLimited(body),
        401 | 403 => UploadError::Auth(format!("{}: {}", code, body)),
        500..=599 => UploadError::Server { status: code, body },
        _ => UploadError::Api { status: code, body },
    }
}

fn cell_to_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl SheetsBackend for GoogleSheetsClient {
    fn spreadsheet_info(&mut self) -> Result<SpreadsheetInfo, UploadError> {
        let id = self.spreadsheet_id.clone();
        let url = self.url(&[id.as_str()], &[("fields", "properties.title,sheets.properties")])?;
        let resp = self.send(self.http.get(url))?;
        let body: SpreadsheetResponse = resp.json()?;
        Ok(SpreadsheetInfo {
            title: body.properties.title,
            worksheets: body
                .sheets
                .into_iter()
                .map(|s| {
                    let grid = s.properties.grid_properties;
                    WorksheetInfo {
                        title: s.properties.title,
                        row_count: grid.as_ref().map_or(0, |g| g.row_count),
                        column_count: grid.as_ref().map_or(0, |g| g.column_count),
                    }
                })
                .collect(),
        })
    }

    fn add_worksheet(&mut self, title: &str, rows: u32, cols: u32) -> Result<(), UploadError> {
        let segment = format!("{}:batchUpdate", self.spreadsheet_id);
        let url = self.url(&[segment.as_str()], &[])?;
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": { "rowCount": rows, "columnCount": cols }
                    }
                }
            }]
        });
        self.send(self.http.post(url).json(&body))?;
        Ok(())
    }

    fn read_values(&mut self, worksheet: &str) -> Result<Vec<Vec<String>>, UploadError> {
        let range = a1_range(worksheet, "");
        let id = self.spreadsheet_id.clone();
        let url = self.url(&[id.as_str(), "values", range.as_str()], &[])?;
        let resp = self.send(self.http.get(url)).map_err(|e| match e {
            UploadError::Api { status: 400, .. } => UploadError::WorksheetNotFound(worksheet.to_string()),
            other => other,
        })?;
        let body: ValueRange = resp.json()?;
        Ok(body
            .values
            .iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect())
    }

    fn update_values(&mut self, worksheet: &str, start_row: u32, rows: &[Vec<String>]) -> Result<(), UploadError> {
        if rows.is_empty() {
            return Ok(());
        }
        let range = a1_range(worksheet, &format!("A{}", start_row.max(1)));
        let id = self.spreadsheet_id.clone();
        let url = self.url(&[id.as_str(), "values", range.as_str()], &[("valueInputOption", "RAW")])?;
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        self.send(self.http.put(url).json(&body))?;
        Ok(())
    }

    fn append_rows(&mut self, worksheet: &str, rows: &[Vec<String>]) -> Result<(), UploadError> {
        if rows.is_empty() {
            return Ok(());
        }
        let range = a1_range(worksheet, "A1");
        let segment = format!("{}:append", range);
        let id = self.spreadsheet_id.clone();
        let url = self.url(
            &[id.as_str(), "values", segment.as_str()],
            &[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")],
        )?;
        let body = json!({ "majorDimension": "ROWS", "values": rows });
        self.send(self.http.post(url).json(&body))?;
        Ok(())
    }

    fn clear_rows(&mut self, worksheet: &str, from_row: u32) -> Result<(), UploadError> {
        let last = col_index_to_letter(CLEAR_COLUMNS - 1);
        let range = a1_range(worksheet, &format!("A{}:{}", from_row.max(1), last));
        let segment = format!("{}:clear", range);
        let id = self.spreadsheet_id.clone();
        let url = self.url(&[id.as_str(), "values", segment.as_str()], &[])?;
        self.send(self.http.post(url).json(&json!({})))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn client() -> GoogleSheetsClient {
        let config = SheetsConfig {
            spreadsheet_id: Some("sheet-id".into()),
            access_token: Some("token".into()),
            ..SheetsConfig::default()
        };
        GoogleSheetsClient::from_config(&config, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn urls_escape_ranges() {
        let c = client();
        let segment = format!("{}:append", a1_range("Budget & Expenses", "A1"));
        let url = c
            .url(&["sheet-id", "values", segment.as_str()], &[("valueInputOption", "RAW")])
            .unwrap();
        let s = url.as_str();
        assert!(s.starts_with("https://sheets.googleapis.com/v4/spreadsheets/sheet-id/values/"));
        assert!(s.ends_with(":append?valueInputOption=RAW"));
        assert!(!s.contains(' '));
        assert!(s.contains("Budget%20&%20Expenses"));
    }

    #[test]
    fn status_codes_map_to_error_classes() {
        assert!(matches!(status_error(429, "quota".into()), UploadError::RateLimited(b) if b == "quota"));
        assert!(matches!(status_error(401, "expired".into()), UploadError::Auth(m) if m == "401: expired"));
        assert!(matches!(status_error(403, "denied".into()), UploadError::Auth(m) if m == "403: denied"));
        assert!(matches!(status_error(503, String::new()), UploadError::Server { status: 503, .. }));
        assert!(matches!(status_error(404, "no sheet".into()), UploadError::Api { status: 404, .. }));
        assert!(status_error(429, String::new()).is_transient());
        assert!(status_error(500, String::new()).is_transient());
        assert!(!status_error(403, String::new()).is_transient());
        assert!(!status_error(404, String::new()).is_transient());
    }

    #[test]
    fn missing_credentials_file_is_an_auth_error() {
        let config = SheetsConfig {
            spreadsheet_id: Some("sheet-id".into()),
            credentials_file: PathBuf::from("/no/such/credentials.json"),
            ..SheetsConfig::default()
        };
        assert!(matches!(
            GoogleSheetsClient::from_config(&config, Duration::from_secs(5)),
            Err(UploadError::Auth(_))
        ));
    }

    #[test]
    fn json_cells_become_strings() {
        assert_eq!(cell_to_string(&json!("a")), "a");
        assert_eq!(cell_to_string(&json!(45.5)), "45.5");
        assert_eq!(cell_to_string(&serde_json::Value::Null), "");
    }
}
