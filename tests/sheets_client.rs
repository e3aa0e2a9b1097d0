//! Purpose: Exercise the blocking Sheets HTTP client against a loopback stub.
//! Exports: None (integration test module).
//! Role: Validate request shape (paths, query, auth, body) and status-to-kind mapping over TCP.
//! Invariants: Uses loopback-only listeners; every response closes its connection.
//! Invariants: Stub threads serve a fixed response script and then exit.

use serde_json::{Value, json};
use sheetrelay::api::{
    Cell, ClientOptions, ErrorKind, Sheets, SheetsClient, StaticToken, ValueInput,
};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Clone, Debug, Default)]
struct Recorded {
    method: String,
    target: String,
    authorization: Option<String>,
    body: String,
}

struct Stub {
    base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
    handle: Option<JoinHandle<()>>,
}

impl Stub {
    /// Serves `script` in order, one connection per response.
    fn start(script: Vec<(u16, Value)>) -> TestResult<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let base_url = format!("http://{}/", listener.local_addr()?);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let handle = thread::spawn(move || {
            for (status, body) in script {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let Ok(request) = read_request(&mut stream) else {
                    return;
                };
                if let Ok(mut guard) = recorded.lock() {
                    guard.push(request);
                }
                let payload = body.to_string();
                let response = format!(
                    "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                    reason(status),
                    payload.len()
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });
        Ok(Self {
            base_url,
            requests,
            handle: Some(handle),
        })
    }

    fn client(&self) -> TestResult<SheetsClient> {
        let options = ClientOptions {
            base_url: self.base_url.clone(),
            timeout_secs: 5,
        };
        Ok(SheetsClient::new(
            &options,
            Box::new(StaticToken::new("test-token")),
        )?)
    }

    fn requests(mut self) -> Vec<Recorded> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

fn read_request(stream: &mut TcpStream) -> std::io::Result<Recorded> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let mut parts = line.split_whitespace();
    let mut recorded = Recorded {
        method: parts.next().unwrap_or_default().to_string(),
        target: parts.next().unwrap_or_default().to_string(),
        ..Recorded::default()
    };

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header)?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.parse().unwrap_or(0),
                "authorization" => recorded.authorization = Some(value.to_string()),
                _ => {}
            }
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;
    recorded.body = String::from_utf8_lossy(&body).to_string();
    Ok(recorded)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

#[test]
fn get_values_sends_bearer_and_stringifies_cells() -> TestResult<()> {
    let stub = Stub::start(vec![(
        200,
        json!({
            "range": "BD_Esteira!A1:E3",
            "majorDimension": "ROWS",
            "values": [["a", 1, true], [], ["x", null, 2.5]]
        }),
    )])?;
    let rows = stub.client()?.get_values("book-1", "BD_Esteira!A:E")?;

    assert_eq!(
        rows,
        vec![
            vec!["a".to_string(), "1".to_string(), "TRUE".to_string()],
            Vec::new(),
            vec!["x".to_string(), String::new(), "2.5".to_string()],
        ]
    );
    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert!(
        requests[0]
            .target
            .starts_with("/v4/spreadsheets/book-1/values/BD_Esteira!A:E?"),
        "{}",
        requests[0].target
    );
    assert!(requests[0].target.contains("majorDimension=ROWS"));
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer test-token"));
    Ok(())
}

#[test]
fn update_values_puts_rows_with_input_option() -> TestResult<()> {
    let stub = Stub::start(vec![(200, json!({"updatedRows": 1}))])?;
    stub.client()?.update_values(
        "book-1",
        "BD_Esteira!A1",
        &[vec![Cell::from("p1"), Cell::from(2.5)]],
        ValueInput::UserEntered,
    )?;

    let requests = stub.requests();
    assert_eq!(requests[0].method, "PUT");
    assert!(requests[0].target.contains("valueInputOption=USER_ENTERED"));
    let body: Value = serde_json::from_str(&requests[0].body)?;
    assert_eq!(body, json!({"majorDimension": "ROWS", "values": [["p1", 2.5]]}));
    Ok(())
}

#[test]
fn batch_get_pads_missing_ranges() -> TestResult<()> {
    let stub = Stub::start(vec![(200, json!({"valueRanges": [{"values": [["X"], ["Y"]]}]}))])?;
    let ranges = vec!["Config!BH3:BH10".to_string(), "Config!BI3:BI10".to_string()];
    let columns = stub.client()?.batch_get_values("origin", &ranges)?;

    assert_eq!(columns.len(), 2);
    assert_eq!(columns[0], vec![vec!["X".to_string()], vec!["Y".to_string()]]);
    assert!(columns[1].is_empty());
    let requests = stub.requests();
    assert!(requests[0].target.starts_with("/v4/spreadsheets/origin/values:batchGet?"));
    assert_eq!(requests[0].target.matches("ranges=").count(), 2);
    Ok(())
}

#[test]
fn sheet_properties_and_resize_round_trip() -> TestResult<()> {
    let stub = Stub::start(vec![
        (
            200,
            json!({"sheets": [
                {"properties": {"sheetId": 0, "title": "Config"}},
                {"properties": {"sheetId": 7, "title": "BD_Esteira",
                    "gridProperties": {"rowCount": 2000, "columnCount": 10}}}
            ]}),
        ),
        (200, json!({"replies": [{}]})),
    ])?;
    let client = stub.client()?;
    let props = client.sheet_properties("book-1")?;
    assert_eq!(props.len(), 2);
    assert_eq!((props[0].row_count, props[0].column_count), (1000, 26));
    assert_eq!(props[1].sheet_id, 7);
    assert_eq!((props[1].row_count, props[1].column_count), (2000, 10));

    client.resize_sheet("book-1", 7, 2600, 26)?;

    let requests = stub.requests();
    assert!(requests[0].target.contains("fields=sheets.properties"));
    assert_eq!(requests[1].method, "POST");
    assert_eq!(requests[1].target, "/v4/spreadsheets/book-1:batchUpdate");
    let body: Value = serde_json::from_str(&requests[1].body)?;
    let props = &body["requests"][0]["updateSheetProperties"]["properties"];
    assert_eq!(props["sheetId"], 7);
    assert_eq!(props["gridProperties"]["rowCount"], 2600);
    Ok(())
}

#[test]
fn clear_posts_to_clear_endpoint() -> TestResult<()> {
    let stub = Stub::start(vec![(200, json!({"clearedRange": "BD_Esteira!A1:E1000"}))])?;
    stub.client()?.clear_values("book-1", "BD_Esteira!A:E")?;

    let requests = stub.requests();
    assert_eq!(requests[0].method, "POST");
    assert_eq!(
        requests[0].target,
        "/v4/spreadsheets/book-1/values/BD_Esteira!A:E:clear"
    );
    Ok(())
}

#[test]
fn statuses_map_to_error_kinds() -> TestResult<()> {
    let stub = Stub::start(vec![
        (503, json!({"error": {"code": 503, "message": "The service is currently unavailable."}})),
        (429, json!({"error": {"code": 429, "status": "RESOURCE_EXHAUSTED"}})),
        (
            403,
            json!({"error": {
                "code": 403,
                "message": "Quota exceeded for quota metric 'Read requests'",
                "status": "PERMISSION_DENIED",
                "errors": [{"reason": "rateLimitExceeded"}]
            }}),
        ),
        (
            403,
            json!({"error": {
                "code": 403,
                "message": "The caller does not have permission",
                "status": "PERMISSION_DENIED"
            }}),
        ),
        (404, json!({"error": {"code": 404, "message": "Requested entity was not found."}})),
    ])?;
    let client = stub.client()?;

    let unavailable = client.get_values("book-1", "A!A:A").err().ok_or("expected error")?;
    assert_eq!(unavailable.kind(), ErrorKind::Unavailable);
    assert_eq!(unavailable.status(), Some(503));
    assert_eq!(unavailable.range(), Some("A!A:A"));
    assert!(unavailable.is_retryable());

    let limited = client.get_values("book-1", "A!A:A").err().ok_or("expected error")?;
    assert_eq!(limited.kind(), ErrorKind::RateLimited);

    let quota = client.get_values("book-1", "A!A:A").err().ok_or("expected error")?;
    assert_eq!(quota.kind(), ErrorKind::RateLimited);
    assert_eq!(quota.status(), Some(403));
    assert_eq!(
        quota.message(),
        Some("Quota exceeded for quota metric 'Read requests'")
    );

    let denied = client.get_values("book-1", "A!A:A").err().ok_or("expected error")?;
    assert_eq!(denied.kind(), ErrorKind::Permission);
    assert!(!denied.is_retryable());

    let missing = client.sheet_properties("nope").err().ok_or("expected error")?;
    assert_eq!(missing.kind(), ErrorKind::NotFound);
    assert_eq!(missing.spreadsheet(), Some("nope"));

    assert_eq!(stub.requests().len(), 5);
    Ok(())
}

#[test]
fn refused_connection_is_retryable_io() -> TestResult<()> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let base_url = format!("http://{}/", listener.local_addr()?);
    drop(listener);

    let options = ClientOptions {
        base_url,
        timeout_secs: 2,
    };
    let client = SheetsClient::new(&options, Box::new(StaticToken::new("t")))?;
    let err = client.get_values("book-1", "A!A:A").err().ok_or("expected error")?;
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(err.is_retryable());
    Ok(())
}

#[test]
fn base_url_with_path_is_rejected() {
    let options = ClientOptions {
        base_url: "https://sheets.googleapis.com/v4".to_string(),
        timeout_secs: 5,
    };
    let err = SheetsClient::new(&options, Box::new(StaticToken::new("t")))
        .err()
        .map(|err| err.kind());
    assert_eq!(err, Some(ErrorKind::Usage));
}
