use chrono::TimeDelta;

const API_TOKEN: &str = "LIFEGUARD_API_TOKEN";

pub fn get_api_token() -> Option<String> {
    let token_from_env = std::env::var(API_TOKEN);
    token_from_env.ok().filter(|token| !token.is_empty())
}

const LOG_FILTER: &str = "LIFEGUARD_LOG";

const DEFAULT_LOG_FILTER: &str = "info";

pub fn get_log_filter() -> String {
    std::env::var(LOG_FILTER).unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string())
}

/// Cut `message` to at most `max_chars` characters, marking the cut with `…`
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }

    let mut truncated: String = message.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

/// Whole seconds as a chrono delta, saturating instead of overflowing
pub fn secs_delta(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}
