//! In-process HTTP server with canned responses, standing in for the sites and
//! favicon providers the resolver talks to.

use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tiles_proto::config::IconsConfig;

#[derive(Clone, Default)]
struct Canned {
    routes: Arc<HashMap<String, (StatusCode, Vec<u8>)>>,
    hits: Arc<Mutex<Vec<String>>>,
}

pub struct CannedServer {
    /// `127.0.0.1:<port>`, no scheme.
    pub host: String,
    hits: Arc<Mutex<Vec<String>>>,
}

impl CannedServer {
    /// Serve `routes` (path → status, body); anything else is a 404.
    pub async fn start(routes: Vec<(&str, StatusCode, Vec<u8>)>) -> Self {
        let canned = Canned {
            routes: Arc::new(
                routes
                    .into_iter()
                    .map(|(path, status, body)| (path.to_string(), (status, body)))
                    .collect(),
            ),
            hits: Arc::default(),
        };
        let hits = canned.hits.clone();

        let app = Router::new().fallback(respond).with_state(canned);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { host, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.host, path)
    }

    /// Paths (with query) requested so far, in order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    /// Icon settings whose two providers live on this server at
    /// `/provider-a?domain=…` and `/provider-b/<domain>.ico`.
    pub fn icons_config(&self) -> IconsConfig {
        IconsConfig {
            timeout_secs: 2,
            user_agent: "tiles-test".to_string(),
            providers: vec![
                self.url("/provider-a?domain={domain}"),
                self.url("/provider-b/{domain}.ico"),
            ],
        }
    }
}

async fn respond(State(canned): State<Canned>, uri: Uri) -> Response {
    let logged = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    canned.hits.lock().unwrap().push(logged);

    let (status, body) = canned
        .routes
        .get(uri.path())
        .cloned()
        .unwrap_or((StatusCode::NOT_FOUND, Vec::new()));

    Response::builder()
        .status(status)
        .body(Body::from(body))
        .unwrap()
}
