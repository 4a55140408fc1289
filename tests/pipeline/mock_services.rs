//! Mock package mirror and external test service for pipeline tests.
//!
//! One in-process HTTP server serves both:
//! - `GET /packages/...` answers with a directory listing for paths ending in
//!   `/` and with the package bytes otherwise
//! - `POST /api/deploy_and_test` records the dispatch body and answers with
//!   the configured response
//! - `GET /api/tasks/{task_id}` replays the configured poll bodies in order,
//!   repeating the last one once the script runs out

use actix_web::{App, HttpRequest, HttpResponse, HttpServer, get, post, web};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};

/// Scripted behaviour of the mock.
pub struct MockState {
    pub listing: String,
    pub package: Vec<u8>,
    pub dispatch_response: Value,
    pub polls: VecDeque<Value>,
    pub last_poll: Option<Value>,
    pub dispatched: Vec<Value>,
    pub polled_tasks: Vec<String>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            listing: listing(&["../", "cds-1.4.0.tar.gz", "cds-1.4.0-release.tar.gz"]),
            package: b"package-bytes".to_vec(),
            dispatch_response: json!({ "task_id": "task-1", "status": "queued" }),
            polls: VecDeque::from([
                json!({ "status": "running" }),
                json!({
                    "status": "completed",
                    "result": { "test": { "report_url": "http://reports.local/cds/1" } }
                }),
            ]),
            last_poll: None,
            dispatched: Vec::new(),
            polled_tasks: Vec::new(),
        }
    }
}

/// Render an nginx-style autoindex page.
pub fn listing(entries: &[&str]) -> String {
    let links: String = entries
        .iter()
        .map(|entry| format!("<a href=\"{entry}\">{entry}</a>\n"))
        .collect();
    format!("<html><body><pre>\n{links}</pre></body></html>")
}

#[get("/packages/{tail:.*}")]
async fn packages(req: HttpRequest, state: web::Data<Arc<Mutex<MockState>>>) -> HttpResponse {
    let state = state.lock().unwrap();
    if req.path().ends_with('/') {
        HttpResponse::Ok()
            .content_type("text/html")
            .body(state.listing.clone())
    } else {
        HttpResponse::Ok()
            .content_type("application/gzip")
            .body(state.package.clone())
    }
}

#[post("/api/deploy_and_test")]
async fn deploy_and_test(
    body: web::Json<Value>,
    state: web::Data<Arc<Mutex<MockState>>>,
) -> HttpResponse {
    let mut state = state.lock().unwrap();
    state.dispatched.push(body.into_inner());
    HttpResponse::Ok().json(state.dispatch_response.clone())
}

#[get("/api/tasks/{task_id}")]
async fn task_status(
    path: web::Path<String>,
    state: web::Data<Arc<Mutex<MockState>>>,
) -> HttpResponse {
    let mut state = state.lock().unwrap();
    state.polled_tasks.push(path.into_inner());

    let body = match state.polls.pop_front() {
        Some(body) => {
            state.last_poll = Some(body.clone());
            body
        }
        None => state
            .last_poll
            .clone()
            .unwrap_or_else(|| json!({ "status": "pending" })),
    };
    HttpResponse::Ok().json(body)
}

/// Handle to a running mock server.
pub struct MockServices {
    pub base_url: String,
    pub state: Arc<Mutex<MockState>>,
}

impl MockServices {
    /// Start the mock on an ephemeral port.
    pub async fn start(initial: MockState) -> Self {
        let state = Arc::new(Mutex::new(initial));

        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
        let port = listener.local_addr().unwrap().port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let state_data = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state_data.clone()))
                .service(packages)
                .service(deploy_and_test)
                .service(task_status)
        })
        .workers(1)
        .listen(listener)
        .expect("failed to listen")
        .disable_signals()
        .run();

        // Lives until the test runtime shuts down
        tokio::spawn(server);

        MockServices { base_url, state }
    }

    /// Mirror base URL, as stored in the download base URL setting.
    pub fn packages_url(&self) -> String {
        format!("{}/packages/", self.base_url)
    }

    pub fn dispatched(&self) -> Vec<Value> {
        self.state.lock().unwrap().dispatched.clone()
    }

    pub fn polled_tasks(&self) -> Vec<String> {
        self.state.lock().unwrap().polled_tasks.clone()
    }
}
