//! HTTP response helpers.

use tiny_http::{Header, Request, Response, StatusCode};

pub const ATOM_CONTENT_TYPE: &str = "application/atom+xml; charset=utf-8";
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Payload of the 500 returned when the artifact cannot be read.
pub const READ_FAILED_MESSAGE: &str = "Read Atom file failed";

/// Respond 200 with the artifact bytes untouched.
pub fn respond_atom(request: Request, body: Vec<u8>) -> std::io::Result<()> {
    let response = Response::from_data(body)
        .with_status_code(StatusCode(200))
        .with_header(make_header("Content-Type", ATOM_CONTENT_TYPE));
    request.respond(response)
}

/// Respond with `{"error": message}`.
pub fn respond_error(request: Request, status: u16, message: &str) -> std::io::Result<()> {
    let body = serde_json::json!({ "error": message }).to_string();
    let response = Response::from_data(body.into_bytes())
        .with_status_code(StatusCode(status))
        .with_header(make_header("Content-Type", JSON_CONTENT_TYPE));
    request.respond(response)
}

pub fn respond_read_failed(request: Request) -> std::io::Result<()> {
    respond_error(request, 500, READ_FAILED_MESSAGE)
}

pub fn respond_not_found(request: Request) -> std::io::Result<()> {
    respond_error(request, 404, "Not Found")
}

pub fn respond_method_not_allowed(request: Request) -> std::io::Result<()> {
    let body = serde_json::json!({ "error": "Method Not Allowed" }).to_string();
    let response = Response::from_data(body.into_bytes())
        .with_status_code(StatusCode(405))
        .with_header(make_header("Content-Type", JSON_CONTENT_TYPE))
        .with_header(make_header("Allow", "GET"));
    request.respond(response)
}

fn make_header(key: &'static str, value: &'static str) -> Header {
    Header::from_bytes(key, value).expect("static header is ASCII")
}
