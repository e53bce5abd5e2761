pub const GIT_HASH: &str = env!("GIT_HASH");

pub fn session_header() -> String {
    let dev = if !GIT_HASH.is_empty() && GIT_HASH != "unknown" {
        format!(" (dev {:.8})", GIT_HASH)
    } else {
        String::from("")
    };

    format!("tick-array version {}{dev}", env!("CARGO_PKG_VERSION"))
}
