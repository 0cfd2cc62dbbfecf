/// An HTTP response under construction.
///
/// Handlers mutate the status string, append header lines and cookies, and
/// set the body; `Content-Length` is computed at serialization time. One
/// instance is reused across a keep-alive connection's requests via
/// [`reset`](Response::reset).
#[derive(Debug)]
pub struct Response {
    status: String,
    headers: Vec<String>,
    body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: "200 OK".to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// 404 with a fixed 20-byte plaintext body.
    pub fn not_found() -> Self {
        let mut resp = Self::new();
        resp.set_status("404 Not Found");
        resp.header("Content-Type", "text/plain");
        resp.set_body("Error 404 Not Found\n");
        resp
    }

    pub fn server_error() -> Self {
        let mut resp = Self::new();
        resp.set_status("500 Internal Server Error");
        resp.header("Content-Type", "text/plain");
        resp.set_body("Error 500 Internal Server Error\n");
        resp
    }

    pub fn unavailable() -> Self {
        let mut resp = Self::new();
        resp.set_status("503 Service Unavailable");
        resp.header("Content-Type", "text/plain");
        resp.set_body("Error 503 Service Unavailable\n");
        resp
    }

    /// Sets the status line text after `HTTP/1.1 `, e.g. `"200 OK"`.
    pub fn set_status(&mut self, status: &str) {
        self.status = status.to_string();
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn header(&mut self, name: &str, value: &str) {
        self.headers.push(format!("{name}: {value}"));
    }

    pub fn has_header(&self, name: &str) -> bool {
        let prefix = format!("{name}:");
        self.headers
            .iter()
            .any(|line| line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(&prefix))
    }

    /// Appends a `Set-Cookie: name=value; Path=p[; Expires=e]` header.
    /// `expires` is an RFC 1123 date when present.
    pub fn set_cookie(&mut self, name: &str, value: &str, path: &str, expires: Option<&str>) {
        let mut line = format!("Set-Cookie: {name}={value}; Path={path}");
        if let Some(when) = expires {
            line.push_str("; Expires=");
            line.push_str(when);
        }
        self.headers.push(line);
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Back to defaults for the next request on a kept-alive connection.
    pub fn reset(&mut self) {
        self.status = "200 OK".to_string();
        self.headers.clear();
        self.body.clear();
    }

    /// Status line + headers + `Content-Length` + blank line + body.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128 + self.body.len());
        buf.extend_from_slice(b"HTTP/1.1 ");
        buf.extend_from_slice(self.status.as_bytes());
        buf.extend_from_slice(b"\r\n");
        for line in &self.headers {
            buf.extend_from_slice(line.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(format!("Content-Length: {}\r\n\r\n", self.body.len()).as_bytes());
        buf.extend_from_slice(&self.body);
        buf
    }
}
