pub mod ask;
pub mod init;
pub mod list;
pub mod new;
pub mod show;
pub mod status;

use council_client::HttpBackend;
use council_config::AppConfig;
use council_core::BackendError;

/// The HTTP backend described by `config`.
pub(crate) fn backend(config: &AppConfig) -> Result<HttpBackend, BackendError> {
    HttpBackend::with_options(
        &config.server.base_url,
        config.server.request_timeout(),
        config.stream.event_buffer,
    )
}
