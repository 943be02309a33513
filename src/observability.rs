use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("aichat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("aichat.client.request_errors");
pub(crate) static CLIENT_REQUEST_RETRIES: Counter = Counter::new("aichat.client.retries");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("aichat.client.request_duration_seconds");
pub(crate) static CLIENT_RETRY_BACKOFF: Moments =
    Moments::new("aichat.client.retry_backoff_seconds");

pub(crate) static CHAT_TURNS: Counter = Counter::new("aichat.chat.turns");
pub(crate) static TEMPLATE_SEGMENTS: Counter = Counter::new("aichat.template.segments");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_REQUEST_RETRIES);
    collector.register_moments(&CLIENT_REQUEST_DURATION);
    collector.register_moments(&CLIENT_RETRY_BACKOFF);

    collector.register_counter(&CHAT_TURNS);
    collector.register_counter(&TEMPLATE_SEGMENTS);
}
