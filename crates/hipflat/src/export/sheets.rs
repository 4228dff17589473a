use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::SinkError;
use crate::types::ListingRecord;

pub const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub const DEFAULT_SHEET_NAME: &str = "物件データ";

const MIN_ROWS: usize = 1000;
const MIN_COLUMNS: usize = 20;
const FLAG_COLUMNS: [&str; 3] = ["furnished", "sauna", "wifi"];

/// Column titles shown in the sheet, aligned with [`ListingRecord::HEADER`].
pub const SHEET_LABELS: [&str; 15] = [
    "物件ID",
    "物件名",
    "住所",
    "1ヶ月賃料",
    "説明",
    "最低利用期間",
    "掲載日",
    "家具",
    "サイズ",
    "階数",
    "サウナ",
    "WiFi",
    "掲載URL",
    "Line",
    "ステータス",
];

/// Destination sheet plus the bearer token used to reach it. The token is
/// obtained elsewhere; this module only presents it.
#[derive(Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub access_token: String,
}

impl std::fmt::Debug for SheetsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsConfig")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("sheet_name", &self.sheet_name)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: Option<GridProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: usize,
    #[serde(default)]
    column_count: usize,
}

#[derive(Debug, Deserialize)]
struct BatchUpdateResponse {
    #[serde(default)]
    replies: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Header cell values: a running number followed by the record columns.
pub fn header_row() -> Vec<String> {
    std::iter::once("No")
        .chain(SHEET_LABELS)
        .map(str::to_string)
        .collect()
}

/// Header plus one row per record, flags rendered as `◯` or left blank.
pub fn sheet_rows(records: &[ListingRecord]) -> Vec<Vec<String>> {
    let mut rows = Vec::with_capacity(records.len() + 1);
    rows.push(header_row());

    for (idx, record) in records.iter().enumerate() {
        let mut row = vec![(idx + 1).to_string()];
        row.extend(
            ListingRecord::HEADER
                .iter()
                .zip(record.to_row())
                .map(|(column, value)| {
                    if FLAG_COLUMNS.contains(column) {
                        (if value == "true" { "◯" } else { "" }).to_string()
                    } else {
                        value
                    }
                }),
        );
        rows.push(row);
    }

    rows
}

/// A1 range covering the whole sheet, with the title quoted.
pub fn sheet_range(sheet_name: &str) -> String {
    format!("'{}'", sheet_name.replace('\'', "''"))
}

fn classify(status: StatusCode, body: &str, spreadsheet_id: &str) -> SinkError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SinkError::Unauthorized(status.as_u16())
        }
        StatusCode::NOT_FOUND => SinkError::SpreadsheetNotFound(spreadsheet_id.to_string()),
        _ => {
            let message = serde_json::from_str::<ApiErrorBody>(body)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| body.chars().take(200).collect());
            SinkError::Api {
                status: status.as_u16(),
                message,
            }
        }
    }
}

/// Google Sheets REST client that overwrites one worksheet per run.
#[derive(Debug, Clone)]
pub struct SheetsSink {
    client: Client,
    api_base: String,
    config: SheetsConfig,
}

impl SheetsSink {
    pub fn new(config: SheetsConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            client,
            api_base: SHEETS_API.to_string(),
            config,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.config.spreadsheet_id
    }

    fn url(&self, segments: &[&str]) -> Result<Url, SinkError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| SinkError::InvalidUrl(format!("{}: {}", self.api_base, e)))?;
        url.path_segments_mut()
            .map_err(|_| SinkError::InvalidUrl(self.api_base.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SinkError> {
        let response = request
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .inspect_err(|e| log::error!("Sheets HTTP error: {e:?}"))?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify(status, &body, &self.config.spreadsheet_id));
        }

        let payload = if body.trim().is_empty() { "{}" } else { body.as_str() };
        serde_json::from_str(payload).map_err(|e| SinkError::Response(e.to_string()))
    }

    async fn find_sheet(&self) -> Result<Option<SheetProperties>, SinkError> {
        let mut url = self.url(&[self.config.spreadsheet_id.as_str()])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties(sheetId,title,gridProperties)");

        let meta: SpreadsheetMeta = self.send(self.client.get(url)).await?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|s| s.properties)
            .find(|p| p.title == self.config.sheet_name))
    }

    async fn batch_update(
        &self,
        requests: Vec<serde_json::Value>,
    ) -> Result<BatchUpdateResponse, SinkError> {
        let segment = format!("{}:batchUpdate", self.config.spreadsheet_id);
        let url = self.url(&[segment.as_str()])?;
        self.send(self.client.post(url).json(&json!({ "requests": requests })))
            .await
    }

    async fn add_sheet(&self, rows: usize, columns: usize) -> Result<i64, SinkError> {
        let response = self
            .batch_update(vec![json!({
                "addSheet": {
                    "properties": {
                        "title": self.config.sheet_name,
                        "gridProperties": { "rowCount": rows, "columnCount": columns }
                    }
                }
            })])
            .await?;

        response
            .replies
            .first()
            .and_then(|r| r.pointer("/addSheet/properties/sheetId"))
            .and_then(|id| id.as_i64())
            .ok_or_else(|| SinkError::Response("addSheet reply without sheetId".to_string()))
    }

    async fn clear_sheet(&self) -> Result<(), SinkError> {
        let segment = format!("{}:clear", sheet_range(&self.config.sheet_name));
        let url = self.url(&[
            self.config.spreadsheet_id.as_str(),
            "values",
            segment.as_str(),
        ])?;
        let _: serde_json::Value = self.send(self.client.post(url).json(&json!({}))).await?;
        Ok(())
    }

    async fn write_values(&self, rows: &[Vec<String>]) -> Result<(), SinkError> {
        let range = format!("{}!A1", sheet_range(&self.config.sheet_name));
        let mut url = self.url(&[
            self.config.spreadsheet_id.as_str(),
            "values",
            range.as_str(),
        ])?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let body = json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        let _: serde_json::Value = self.send(self.client.put(url).json(&body)).await?;
        Ok(())
    }

    /// Clears (or creates) the target sheet and writes header plus all rows.
    /// Returns the number of rows written, header included.
    ///
    /// An empty table is refused so a failed scrape never wipes the sheet.
    pub async fn write(&self, records: &[ListingRecord]) -> Result<usize, SinkError> {
        if records.is_empty() {
            return Err(SinkError::EmptyTable);
        }

        let rows = sheet_rows(records);
        let columns = rows[0].len();
        let needed_rows = rows.len().max(MIN_ROWS);

        let mut format_requests = Vec::new();
        let sheet_id = match self.find_sheet().await? {
            Some(properties) => {
                log::info!("Clearing sheet '{}'", properties.title);
                self.clear_sheet().await?;

                let (current_rows, current_columns) = properties
                    .grid_properties
                    .map(|g| (g.row_count, g.column_count))
                    .unwrap_or((MIN_ROWS, MIN_COLUMNS));
                for (dimension, current, needed) in [
                    ("ROWS", current_rows, rows.len()),
                    ("COLUMNS", current_columns, columns),
                ] {
                    if current < needed {
                        format_requests.push(json!({
                            "appendDimension": {
                                "sheetId": properties.sheet_id,
                                "dimension": dimension,
                                "length": needed - current
                            }
                        }));
                    }
                }
                properties.sheet_id
            }
            None => {
                log::info!("Creating sheet '{}'", self.config.sheet_name);
                self.add_sheet(needed_rows, columns.max(MIN_COLUMNS)).await?
            }
        };

        format_requests.push(json!({
            "repeatCell": {
                "range": { "sheetId": sheet_id, "startRowIndex": 0, "endRowIndex": 1 },
                "cell": {
                    "userEnteredFormat": {
                        "textFormat": { "bold": true },
                        "backgroundColor": { "red": 0.9, "green": 0.9, "blue": 0.9 }
                    }
                },
                "fields": "userEnteredFormat(textFormat,backgroundColor)"
            }
        }));
        self.batch_update(format_requests).await?;

        self.write_values(&rows).await?;
        log::info!(
            "Updated spreadsheet {} with {} row(s)",
            self.config.spreadsheet_id,
            rows.len()
        );
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Debug, Clone)]
    struct Captured {
        method: String,
        target: String,
        authorization: Option<String>,
        body: String,
    }

    /// Minimal HTTP/1.1 responder: answers each accepted connection with the
    /// next canned JSON body and records what it received.
    async fn spawn_api(replies: Vec<&'static str>) -> (String, Arc<Mutex<Vec<Captured>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let captured = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&captured);

        tokio::spawn(async move {
            for reply in replies {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let request = read_request(&mut socket).await;
                log.lock().unwrap().push(request);

                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    reply.len(),
                    reply
                );
                socket.write_all(response.as_bytes()).await.ok();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{addr}/v4/spreadsheets"), captured)
    }

    async fn read_request(socket: &mut TcpStream) -> Captured {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let head_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos;
            }
            let n = socket.read(&mut chunk).await.expect("read head");
            assert!(n > 0, "connection closed before headers");
            buf.extend_from_slice(&chunk[..n]);
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let mut lines = head.lines();
        let mut request_line = lines.next().unwrap_or_default().split_whitespace();
        let method = request_line.next().unwrap_or_default().to_string();
        let target = request_line.next().unwrap_or_default().to_string();

        let mut content_length = 0;
        let mut authorization = None;
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                } else if name.eq_ignore_ascii_case("authorization") {
                    authorization = Some(value.trim().to_string());
                }
            }
        }

        let body_start = head_end + 4;
        while buf.len() < body_start + content_length {
            let n = socket.read(&mut chunk).await.expect("read body");
            assert!(n > 0, "connection closed before body");
            buf.extend_from_slice(&chunk[..n]);
        }

        Captured {
            method,
            target,
            authorization,
            body: String::from_utf8_lossy(&buf[body_start..body_start + content_length])
                .to_string(),
        }
    }

    fn stub_sink(api_base: String) -> SheetsSink {
        SheetsSink::new(SheetsConfig {
            spreadsheet_id: "sheet-123".into(),
            sheet_name: "Listings".into(),
            access_token: "token".into(),
        })
        .expect("client")
        .with_api_base(api_base)
    }

    fn one_record() -> Vec<ListingRecord> {
        vec![ListingRecord {
            name: Some("Dusit Grand Park".into()),
            wifi: true,
            ..ListingRecord::new("https://www.hipflat.co.th/ja/listings/a1")
        }]
    }

    fn sink() -> SheetsSink {
        SheetsSink::new(SheetsConfig {
            spreadsheet_id: "sheet-123".into(),
            sheet_name: DEFAULT_SHEET_NAME.into(),
            access_token: "token".into(),
        })
        .expect("client")
    }

    #[test]
    fn test_sheet_rows_for_empty_table() {
        let rows = sheet_rows(&[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "No");
        assert_eq!(&rows[0][1..], &SHEET_LABELS.map(String::from));
    }

    #[test]
    fn test_sheet_rows_render_flags() {
        let record = ListingRecord {
            sauna: true,
            wifi: false,
            furnished: true,
            floor: Some(3),
            ..ListingRecord::new("https://www.hipflat.co.th/ja/listings/a1")
        };

        let rows = sheet_rows(&[record.clone(), record]);
        assert_eq!(rows.len(), 3);

        let header = &rows[0];
        let col = |name: &str| header.iter().position(|h| h == name).expect("column");
        assert_eq!(rows[1][col("No")], "1");
        assert_eq!(rows[2][col("No")], "2");
        assert_eq!(rows[1][col("サウナ")], "◯");
        assert_eq!(rows[1][col("WiFi")], "");
        assert_eq!(rows[1][col("家具")], "◯");
        assert_eq!(rows[1][col("階数")], "3");
        assert_eq!(rows[1][col("物件ID")], "a1");
    }

    #[test]
    fn test_sheet_range_quotes_title() {
        assert_eq!(sheet_range("物件データ"), "'物件データ'");
        assert_eq!(sheet_range("Bob's"), "'Bob''s'");
    }

    #[test]
    fn test_url_encodes_segments() {
        let sink = sink();
        let range = format!("{}!A1", sheet_range(DEFAULT_SHEET_NAME));
        let url = sink
            .url(&[sink.spreadsheet_id(), "values", range.as_str()])
            .expect("url");

        assert!(url.as_str().starts_with(
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-123/values/"
        ));
        assert!(!url.path().contains("物件"), "Sheet title is percent-encoded");
        assert_eq!(url.path_segments().map(|s| s.count()), Some(5));
    }

    #[test]
    fn test_classify_errors() {
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, "", "id"),
            SinkError::Unauthorized(401)
        ));
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, "", "id"),
            SinkError::SpreadsheetNotFound(id) if id == "id"
        ));

        let body = r#"{"error":{"code":400,"message":"Unable to parse range","status":"INVALID_ARGUMENT"}}"#;
        match classify(StatusCode::BAD_REQUEST, body, "id") {
            SinkError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Unable to parse range");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_write_clears_existing_sheet() {
        let (api, captured) = spawn_api(vec![
            r#"{"sheets":[{"properties":{"sheetId":42,"title":"Listings","gridProperties":{"rowCount":1,"columnCount":5}}}]}"#,
            "{}",
            r#"{"replies":[{},{},{}]}"#,
            r#"{"updatedRows":2}"#,
        ])
        .await;

        let written = stub_sink(api).write(&one_record()).await.expect("write");
        assert_eq!(written, 2);

        let requests = captured.lock().unwrap().clone();
        assert_eq!(requests.len(), 4);
        assert!(
            requests
                .iter()
                .all(|r| r.authorization.as_deref() == Some("Bearer token"))
        );

        assert_eq!(requests[0].method, "GET");
        assert!(requests[0].target.starts_with("/v4/spreadsheets/sheet-123?fields="));

        assert_eq!(requests[1].method, "POST");
        assert!(requests[1].target.ends_with(":clear"));
        assert!(requests[1].target.contains("/sheet-123/values/"));

        assert_eq!(requests[2].method, "POST");
        assert_eq!(requests[2].target, "/v4/spreadsheets/sheet-123:batchUpdate");
        let batch: serde_json::Value =
            serde_json::from_str(&requests[2].body).expect("batch body");
        let ops = batch["requests"].as_array().expect("requests array");
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0]["appendDimension"]["dimension"], "ROWS");
        assert_eq!(ops[0]["appendDimension"]["length"], 1);
        assert_eq!(ops[1]["appendDimension"]["dimension"], "COLUMNS");
        assert_eq!(ops[1]["appendDimension"]["length"], 11);
        assert_eq!(ops[1]["appendDimension"]["sheetId"], 42);
        assert_eq!(ops[2]["repeatCell"]["range"]["sheetId"], 42);

        assert_eq!(requests[3].method, "PUT");
        assert!(requests[3].target.ends_with("?valueInputOption=RAW"));
        let values: serde_json::Value =
            serde_json::from_str(&requests[3].body).expect("values body");
        assert_eq!(values["values"][0][0], "No");
        assert_eq!(values["values"][1][2], "Dusit Grand Park");
    }

    #[tokio::test]
    async fn test_write_adds_missing_sheet() {
        let (api, captured) = spawn_api(vec![
            r#"{"sheets":[{"properties":{"sheetId":0,"title":"Sheet1"}}]}"#,
            r#"{"replies":[{"addSheet":{"properties":{"sheetId":777,"title":"Listings"}}}]}"#,
            r#"{"replies":[{}]}"#,
            r#"{"updatedRows":2}"#,
        ])
        .await;

        stub_sink(api).write(&one_record()).await.expect("write");

        let requests = captured.lock().unwrap().clone();
        assert_eq!(requests.len(), 4);
        assert!(requests.iter().all(|r| !r.target.ends_with(":clear")));

        let add: serde_json::Value = serde_json::from_str(&requests[1].body).expect("add body");
        let props = &add["requests"][0]["addSheet"]["properties"];
        assert_eq!(props["title"], "Listings");
        assert_eq!(props["gridProperties"]["rowCount"], MIN_ROWS);
        assert_eq!(props["gridProperties"]["columnCount"], MIN_COLUMNS);

        let format: serde_json::Value =
            serde_json::from_str(&requests[2].body).expect("format body");
        assert_eq!(format["requests"].as_array().map(Vec::len), Some(1));
        assert_eq!(format["requests"][0]["repeatCell"]["range"]["sheetId"], 777);

        assert_eq!(requests[3].method, "PUT");
    }

    #[tokio::test]
    async fn test_write_refuses_empty_table() {
        let (api, captured) = spawn_api(vec![]).await;

        let err = stub_sink(api).write(&[]).await.unwrap_err();
        assert!(matches!(err, SinkError::EmptyTable));
        assert!(captured.lock().unwrap().is_empty(), "No request is sent");
    }
}
