use crate::config::{Config, HeaderRule, Template};
use bandgo_util::random::{random_alphanumeric, random_dotted_quad};
use hyper::header::{HeaderName, HeaderValue, REFERER, USER_AGENT};
use hyper::HeaderMap;
use rand::rngs::SmallRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tracing::trace;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// Browser signatures rotated through the `User-Agent` header.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.2420.81",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36 OPR/108.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Fedora; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/124.0.6367.88 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPad; CPU OS 17_4_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.6367.82 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 14; SM-S918B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.6367.82 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-A536B) AppleWebKit/537.36 (KHTML, like Gecko) SamsungBrowser/24.0 Chrome/117.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Android 14; Mobile; rv:125.0) Gecko/125.0 Firefox/125.0",
];

/// Fills in the per-request identifying headers.
///
/// Owns its generator so workers never contend on a shared one.
pub struct HeaderRandomizer<R = SmallRng> {
    rng: R,
}

impl HeaderRandomizer {
    #[must_use]
    pub fn from_os_rng() -> Self {
        Self::new(SmallRng::from_os_rng())
    }
}

impl<R: Rng> HeaderRandomizer<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn apply(&mut self, headers: &mut HeaderMap, config: &Config) {
        if let Some(agent) = USER_AGENTS.choose(&mut self.rng) {
            headers.insert(USER_AGENT, HeaderValue::from_static(*agent));
        }
        headers.insert(REFERER, config.referer.clone());

        if config.forwarded_for {
            let quad = random_dotted_quad(&mut self.rng);
            if let Ok(ip) = HeaderValue::from_str(&quad) {
                headers.insert(X_FORWARDED_FOR, ip.clone());
                headers.insert(X_REAL_IP, ip);
            }
        }

        for rule in &config.headers {
            let Some((name, value)) = self.resolve(rule) else {
                trace!(?rule, "Skipping unrepresentable header");
                continue;
            };
            // insert drops every earlier value under the key, later rules win
            headers.insert(name, value);
        }
    }

    fn resolve(&mut self, rule: &HeaderRule) -> Option<(HeaderName, HeaderValue)> {
        let name = match &rule.name {
            Template::Literal(name) => name.clone(),
            Template::Random(len) => {
                HeaderName::from_bytes(random_alphanumeric(&mut self.rng, *len).as_bytes()).ok()?
            }
        };
        let value = match &rule.value {
            Template::Literal(value) => value.clone(),
            Template::Random(len) => {
                HeaderValue::from_str(&random_alphanumeric(&mut self.rng, *len)).ok()?
            }
        };
        Some((name, value))
    }
}
