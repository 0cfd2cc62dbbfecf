/// One received HTTP request, kept as raw text.
///
/// Header fields are looked up lazily by scanning the raw lines rather
/// than parsed into a map up front: callers ask for one field or cookie
/// at a time and the device never pays for headers it ignores.
#[derive(Debug, Clone)]
pub struct Request {
    raw: String,
}

impl Request {
    pub fn new(raw: String) -> Self {
        Self { raw }
    }

    /// The raw request text (request line + headers), as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    fn request_line(&self) -> &str {
        self.raw.split("\r\n").next().unwrap_or("")
    }

    pub fn method(&self) -> &str {
        self.request_line().split_whitespace().next().unwrap_or("")
    }

    /// Request target, query string included.
    pub fn path(&self) -> &str {
        self.request_line().split_whitespace().nth(1).unwrap_or("")
    }

    /// Case-insensitive header field lookup.
    pub fn field(&self, name: &str) -> Option<&str> {
        for line in self.raw.split("\r\n").skip(1) {
            if line.is_empty() {
                break;
            }
            if let Some((key, value)) = line.split_once(':')
                && key.trim().eq_ignore_ascii_case(name)
            {
                return Some(value.trim());
            }
        }
        None
    }

    /// Looks one cookie up inside the `Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        let cookies = self.field("Cookie")?;
        for part in cookies.split(';') {
            if let Some((key, value)) = part.split_once('=')
                && key.trim() == name
            {
                return Some(value.trim());
            }
        }
        None
    }

    pub fn is_websocket_upgrade(&self) -> bool {
        self.field("Upgrade")
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false)
    }

    /// Whether the client asked for connection reuse. Unlike general
    /// HTTP/1.1, reuse here requires an explicit `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        self.field("Connection")
            .map(|v| v.eq_ignore_ascii_case("keep-alive"))
            .unwrap_or(false)
    }
}
