use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::{ArgAction, Parser};
use hyper::header::{HeaderName, HeaderValue};
use hyper::Uri;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

/// Worker count used when the configured count resolves to nothing.
pub const DEFAULT_WORKERS: usize = 16;

const RANDOM_DIRECTIVE: &str = "Random";

const EXAMPLES: &str = "\
Advanced Examples:
  bandgo -c 16 -s https://some.website -r https://referer.url -i 10.0.0.1 -i 10.0.0.2
        16 concurrent to benchmark https://some.website with https://referer.url directly to IP 10.0.0.1 and 10.0.0.2

  bandgo -c 16 -s https://some.website -r https://referer.url
        16 concurrent to benchmark https://some.website with https://referer.url to DNS resolved IP address

  bandgo -s https://some.website -H \"Authorization:Bearer token123\" -H \"Content-Type:application/json\"
        Benchmark with custom headers

  bandgo -s https://some.website -H \"Random8:Random16\"
        Send a header with a fresh 8 character name and 16 character value on every request";

#[derive(Parser, Debug)]
#[command(name = "bandgo", version, about = "Make your bandwidth GO away!", after_help = EXAMPLES)]
pub struct Args {
    /// Concurrent workers, raised to the number of custom IPs when lower
    #[arg(short = 'c', long, default_value_t = 16, allow_negative_numbers = true)]
    pub concurrent: i64,

    /// Target URL
    #[arg(short = 's', long)]
    pub target: String,

    /// Post content, requests are sent as GET when empty
    #[arg(short = 'p', long = "post", default_value = "")]
    pub post_content: String,

    /// Referer URL, defaults to the target URL
    #[arg(short = 'r', long, default_value = "")]
    pub referer: String,

    /// Randomize X-Forwarded-For and X-Real-IP address
    #[arg(
        short = 'f',
        long,
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub forwarded_for: bool,

    /// Custom IP address for the target host, multiple addresses are picked at random
    #[arg(short = 'i', long = "ip")]
    pub custom_ips: Vec<IpAddr>,

    /// Custom header in format 'Key:Value', either side may be RandomN
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<HeaderRule>,
}

/// One side of a header rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template<T> {
    Literal(T),
    /// Replaced by a fresh alphanumeric string of this length on every request.
    Random(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRule {
    pub name: Template<HeaderName>,
    pub value: Template<HeaderValue>,
}

impl FromStr for HeaderRule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((key, value)) = s.split_once(':') else {
            bail!("Header `{s}` is not in `Key:Value` format");
        };
        let name = match random_directive(key) {
            Some(0) => bail!("Header name `{key}` would generate an empty name"),
            Some(len) => Template::Random(len),
            None => Template::Literal(
                HeaderName::from_bytes(key.as_bytes())
                    .with_context(|| format!("Invalid header name `{key}`"))?,
            ),
        };
        let value = value.trim();
        let value = match random_directive(value) {
            Some(len) => Template::Random(len),
            None => Template::Literal(
                HeaderValue::from_str(value)
                    .with_context(|| format!("Invalid value for header `{key}`"))?,
            ),
        };
        Ok(Self { name, value })
    }
}

/// `RandomN` with N a plain decimal number.
fn random_directive(s: &str) -> Option<usize> {
    let digits = s.strip_prefix(RANDOM_DIRECTIVE)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Validated, immutable run configuration shared by every worker.
#[derive(Debug, Clone)]
pub struct Config {
    pub target: Uri,
    pub post_body: Option<Bytes>,
    pub referer: HeaderValue,
    pub forwarded_for: bool,
    pub custom_ips: Arc<[IpAddr]>,
    pub headers: Vec<HeaderRule>,
    pub concurrent: i64,
}

impl Config {
    #[inline]
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        effective_workers(self.concurrent, self.custom_ips.len())
    }
}

impl TryFrom<Args> for Config {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self> {
        let target: Uri = args
            .target
            .parse()
            .with_context(|| format!("Invalid target URL `{}`", args.target))?;
        match target.scheme_str() {
            Some("http" | "https") => {}
            _ => bail!("Target URL `{target}` must use http or https"),
        }
        if target.host().is_none() {
            bail!("Target URL `{target}` has no host");
        }
        let referer = if args.referer.is_empty() {
            &args.target
        } else {
            &args.referer
        };
        let referer = HeaderValue::from_str(referer)
            .with_context(|| format!("Invalid referer `{referer}`"))?;
        let post_body = (!args.post_content.is_empty()).then(|| Bytes::from(args.post_content));
        Ok(Self {
            target,
            post_body,
            referer,
            forwarded_for: args.forwarded_for,
            custom_ips: args.custom_ips.into(),
            headers: args.headers,
            concurrent: args.concurrent,
        })
    }
}

/// At least one worker per custom IP, [`DEFAULT_WORKERS`] when nothing positive is left.
#[must_use]
pub fn effective_workers(configured: i64, custom_ips: usize) -> usize {
    let workers = configured.max(i64::try_from(custom_ips).unwrap_or(i64::MAX));
    if workers <= 0 {
        DEFAULT_WORKERS
    } else {
        usize::try_from(workers).unwrap_or(DEFAULT_WORKERS)
    }
}
