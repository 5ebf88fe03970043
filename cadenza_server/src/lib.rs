// cadenza_server — HTTP front end for melody continuation.
//
// A thin request/response layer over `cadenza_core::pipeline`. A client
// POSTs a seed MIDI file to `/generate` and gets the continued melody back
// as `audio/midi`. All musical logic lives in the core crate; this crate
// only parses the request, builds a per-request RNG and deadline, and maps
// the outcome to an HTTP status.
//
// Module overview:
// - `config.rs`:  `ServerConfig` (listen address, worker count, request
//                 limits) plus the `CadenzaConfig` used for every request.
// - `server.rs`:  `tiny_http` listener shared by a fixed pool of worker
//                 threads, request routing, and query parameter overrides.
// - `upload.rs`:  pulls the seed file out of a multipart form or takes the
//                 raw body as the file.
// - `error.rs`:   `ServerError`.
//
// The server can run as a standalone binary (`main.rs`) or be embedded in
// another process via the library API (`start_server`).

pub mod config;
pub mod error;
pub mod server;
pub mod upload;

pub use error::{Result, ServerError};
pub use server::start_server;
