//! Shared User-Agent string for listing, probe and transfer requests.

/// Project URL carried in the User-Agent.
const PROJECT_UA_URL: &str = "https://github.com/fierce/dirpull";

/// Default User-Agent for every request.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("dirpull/{version} (listing-mirror; +{PROJECT_UA_URL})")
}
