// HTTP listener and worker pool.
//
// Architecture: one `tiny_http::Server` shared by a fixed pool of worker
// threads.
//
// - **Workers** (`config.workers` of them): each loops on
//   `Server::recv_timeout`, handles one request to completion, then takes
//   the next. A generation run is single-threaded, so the pool size is the
//   number of runs that can proceed at once.
// - **Models** are built once by the caller and shared read-only through
//   `Models` (an `Arc` pair). Nothing else is shared between requests.
// - **Per request**: a fresh `SampleRng` (from the `seed` query parameter,
//   or else the clock) and a `CancelToken` carrying the configured deadline.
//
// Routes:
//   POST    /generate   seed MIDI as a multipart `file` part or as the raw
//                       body, reply = continued MIDI file
//   GET     /health     "ok"
//   OPTIONS *          204, for CORS preflight
//
// Every response carries permissive CORS headers. Errors are JSON objects
// of the form {"error": "..."}.
//
// Shutdown: workers check a `keep_running` flag (cleared by
// `ServerHandle::stop`) between requests. The `recv_timeout` poll bounds how
// long that takes.

use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use cadenza_core::config::CadenzaConfig;
use cadenza_core::generator::CancelToken;
use cadenza_core::model::Models;
use cadenza_core::pipeline::continue_melody;
use cadenza_prng::SampleRng;
use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::upload::seed_file;

/// How often idle workers wake up to check `keep_running`.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

/// Handle returned by `start_server` to control the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Signal the workers to stop and wait for them to finish their current
    /// requests.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        self.wait();
    }

    /// Block until every worker exits.
    pub fn wait(self) {
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

/// State shared by all workers.
struct AppState {
    config: ServerConfig,
    models: Models,
}

/// Start the server on background threads. Returns a handle for stopping it
/// and the actual bound address (useful when port 0 is used to let the OS
/// pick a free port).
pub fn start_server(config: ServerConfig, models: Models) -> Result<(ServerHandle, SocketAddr)> {
    config.validate()?;
    let server = Server::http((config.host.as_str(), config.port))
        .map_err(|e| ServerError::Bind(e.to_string()))?;
    let addr = server
        .server_addr()
        .to_ip()
        .ok_or_else(|| ServerError::Bind("listener has no IP address".into()))?;

    let server = Arc::new(server);
    let keep_running = Arc::new(AtomicBool::new(true));
    let worker_count = config.workers;
    let state = Arc::new(AppState { config, models });

    let mut workers = Vec::with_capacity(worker_count);
    for i in 0..worker_count {
        let server = server.clone();
        let state = state.clone();
        let keep_running = keep_running.clone();
        let worker = thread::Builder::new()
            .name(format!("cadenza-worker-{i}"))
            .spawn(move || run_worker(&server, &state, &keep_running))?;
        workers.push(worker);
    }

    info!("Listening on {addr} with {worker_count} workers");
    Ok((
        ServerHandle {
            keep_running,
            workers,
        },
        addr,
    ))
}

fn run_worker(server: &Server, state: &AppState, keep_running: &AtomicBool) {
    while keep_running.load(Ordering::SeqCst) {
        match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => handle_request(state, request),
            Ok(None) => {}
            Err(e) => {
                error!("Listener failed: {e}");
                break;
            }
        }
    }
}

/// A response before headers are attached.
struct Reply {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
    attachment: bool,
}

impl Reply {
    fn empty(status: u16) -> Self {
        Reply {
            status,
            content_type: "text/plain",
            body: Vec::new(),
            attachment: false,
        }
    }

    fn text(status: u16, text: &str) -> Self {
        Reply {
            body: text.as_bytes().to_vec(),
            ..Reply::empty(status)
        }
    }

    fn error(status: u16, message: &str) -> Self {
        #[derive(Serialize)]
        struct ErrorBody<'a> {
            error: &'a str,
        }
        Reply {
            status,
            content_type: "application/json",
            body: serde_json::to_vec(&ErrorBody { error: message }).unwrap_or_default(),
            attachment: false,
        }
    }

    fn midi(bytes: Vec<u8>) -> Self {
        Reply {
            status: 200,
            content_type: "audio/midi",
            body: bytes,
            attachment: true,
        }
    }

    fn into_response(self) -> Response<Cursor<Vec<u8>>> {
        let mut headers = vec![("Content-Type", self.content_type)];
        if self.attachment {
            headers.push(("Content-Disposition", "attachment; filename=\"generated.mid\""));
        }
        headers.extend(CORS_HEADERS);

        let mut response = Response::from_data(self.body).with_status_code(StatusCode(self.status));
        for (name, value) in headers {
            if let Ok(header) = Header::from_bytes(name, value) {
                response.add_header(header);
            }
        }
        response
    }
}

fn handle_request(state: &AppState, mut request: Request) {
    let started = Instant::now();
    let method = request.method().clone();
    let url = request.url().to_owned();
    let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));

    let reply = match (&method, path) {
        (Method::Options, _) => Reply::empty(204),
        (Method::Get, "/health") => Reply::text(200, "ok"),
        (Method::Post, "/generate") => handle_generate(state, &mut request, query),
        _ => Reply::error(404, "Not found"),
    };

    info!(
        "{method} {path} -> {} ({} bytes, {:.0?})",
        reply.status,
        reply.body.len(),
        started.elapsed()
    );
    if let Err(e) = request.respond(reply.into_response()) {
        warn!("Failed to send response: {e}");
    }
}

fn handle_generate(state: &AppState, request: &mut Request, query: &str) -> Reply {
    let limit = state.config.max_upload_bytes;
    if request.body_length().is_some_and(|len| len > limit) {
        return Reply::error(413, &ServerError::PayloadTooLarge(limit).to_string());
    }
    let content_type = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_owned());
    let body = match read_body(request.as_reader(), limit) {
        Ok(body) => body,
        Err(e @ ServerError::PayloadTooLarge(_)) => return Reply::error(413, &e.to_string()),
        Err(e) => return Reply::error(400, &e.to_string()),
    };
    let seed_midi = match seed_file(content_type.as_deref(), &body) {
        Ok(file) => file,
        Err(e) => return Reply::error(400, &e.to_string()),
    };

    let params = match GenerateParams::from_query(query) {
        Ok(params) => params,
        Err(e) => return Reply::error(400, &e.to_string()),
    };
    let config = match params.apply(&state.config.cadenza, state.config.max_steps) {
        Ok(config) => config,
        Err(e) => return Reply::error(400, &e.to_string()),
    };

    let seed = params.seed.unwrap_or_else(clock_seed);
    let mut rng = SampleRng::new(seed);
    let cancel = CancelToken::with_timeout(Duration::from_millis(state.config.request_deadline_ms));

    match continue_melody(seed_midi, &state.models, &config, &mut rng, &cancel) {
        Ok(continuation) => {
            debug!(
                "Continued {} seed notes with {} generated (rng seed {seed})",
                continuation.seed_notes,
                continuation.generated_notes()
            );
            Reply::midi(continuation.midi)
        }
        Err(e) => {
            if e.is_input_error() {
                warn!("Rejected upload: {e}");
            } else {
                error!("Generation failed: {e}");
            }
            Reply::error(500, &e.to_string())
        }
    }
}

/// Read at most `limit` bytes. One extra byte is requested so that an
/// oversized body without a Content-Length header is still caught.
fn read_body(reader: &mut dyn Read, limit: usize) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    reader.take(limit as u64 + 1).read_to_end(&mut body)?;
    if body.len() > limit {
        return Err(ServerError::PayloadTooLarge(limit));
    }
    Ok(body)
}

/// Per-request overrides taken from the `/generate` query string.
#[derive(Debug, Default, Clone, PartialEq)]
struct GenerateParams {
    steps: Option<usize>,
    temperature: Option<f64>,
    window: Option<usize>,
    seed: Option<u64>,
}

impl GenerateParams {
    fn from_query(query: &str) -> Result<Self> {
        let mut params = GenerateParams::default();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "steps" => params.steps = Some(parse_param(key, value)?),
                "temperature" => params.temperature = Some(parse_param(key, value)?),
                "window" => params.window = Some(parse_param(key, value)?),
                "seed" => params.seed = Some(parse_param(key, value)?),
                other => debug!("Ignoring unknown query parameter {other:?}"),
            }
        }
        Ok(params)
    }

    /// Layer the overrides on top of `base` and validate the result.
    fn apply(&self, base: &CadenzaConfig, max_steps: usize) -> Result<CadenzaConfig> {
        let mut config = base.clone();
        if let Some(steps) = self.steps {
            if steps > max_steps {
                return Err(ServerError::BadRequest(format!(
                    "steps must be at most {max_steps}, got {steps}"
                )));
            }
            config.generation.steps = steps;
        }
        if let Some(temperature) = self.temperature {
            config.generation.temperature = temperature;
        }
        if let Some(window) = self.window {
            config.generation.window = window;
        }
        config
            .validate()
            .map_err(|e| ServerError::BadRequest(e.to_string()))?;
        Ok(config)
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ServerError::BadRequest(format!("invalid value for {key}: {value:?}")))
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
