use anyhow::anyhow;
use reqwest::StatusCode;
use std::error::Error as StdError;
use std::io::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportFailure {
    TimedOut,
    Refused,
    Unreachable,
    Other,
}

fn chain_matches(
    err: &(dyn StdError + 'static),
    kind: ErrorKind,
    needle: &str,
) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>()
            && io_err.kind() == kind
        {
            return true;
        }
        if source.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }
        current = source.source();
    }
    false
}

fn classify(err: &reqwest::Error) -> TransportFailure {
    if err.is_timeout() || chain_matches(err, ErrorKind::TimedOut, "timed out") {
        TransportFailure::TimedOut
    } else if err.is_connect() {
        if chain_matches(err, ErrorKind::ConnectionRefused, "connection refused") {
            TransportFailure::Refused
        } else {
            TransportFailure::Unreachable
        }
    } else {
        TransportFailure::Other
    }
}

pub(crate) fn model_api_request_error(
    err: reqwest::Error,
    api_url: &str,
    timeout_secs: u64,
) -> anyhow::Error {
    match classify(&err) {
        TransportFailure::TimedOut => anyhow!(
            "Model API at '{}' did not respond within {}s. \
             Increase MODEL_TIMEOUT_SECS or check provider status.",
            api_url,
            timeout_secs
        ),
        TransportFailure::Refused => anyhow!(
            "Connection refused by model API at '{}'. \
             Check that OPENAI_BASE_URL points at a running server.",
            api_url
        ),
        TransportFailure::Unreachable => anyhow!(
            "Could not reach model API at '{}'. \
             Check OPENAI_BASE_URL and network connectivity.",
            api_url
        ),
        TransportFailure::Other => anyhow!("Failed to call model API at '{}': {}", api_url, err),
    }
}

pub(crate) fn model_api_status_error(status: StatusCode, api_url: &str, body: &str) -> anyhow::Error {
    let hint = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => " Check OPENAI_API_KEY.",
        StatusCode::NOT_FOUND => " Check OPENAI_BASE_URL and the requested model.",
        StatusCode::TOO_MANY_REQUESTS => " The provider is rate limiting requests.",
        _ => "",
    };
    anyhow!(
        "Model API at '{}' returned status {}:{} {}",
        api_url,
        status,
        hint,
        body.trim()
    )
}
