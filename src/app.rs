use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api;
use crate::config;
use crate::data::{
    ApiChannelService, ApiReportService, ApiThreadService, ChannelService, ReportService,
    ThreadService,
};
use crate::ui;

// Command-line overrides; anything unset falls back to the config file and
// its defaults.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub server_url: Option<String>,
    pub channel_id: Option<String>,
}

pub fn run(options: Options) -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;

    let base_url = options
        .server_url
        .unwrap_or_else(|| cfg.server.base_url.clone());
    let bootstrap_channel = options.channel_id.or_else(|| {
        let configured = cfg.browse.channel_id.trim();
        (!configured.is_empty()).then(|| configured.to_string())
    });

    let client = Arc::new(
        api::Client::new(api::ClientConfig {
            base_url: base_url.clone(),
            timeout: cfg.server.timeout,
            http_client: None,
        })
        .context("create backend client")?,
    );

    let channel_service: Arc<dyn ChannelService> =
        Arc::new(ApiChannelService::new(client.clone()));
    let thread_service: Arc<dyn ThreadService> = Arc::new(ApiThreadService::new(client.clone()));
    let report_service: Arc<dyn ReportService> = Arc::new(ApiReportService::new(client));

    let ui_options = ui::Options {
        status_message: format!("Connecting to {base_url}…"),
        channel_service,
        thread_service,
        report_service,
        thread_limit: cfg.browse.thread_limit,
        bootstrap_channel,
        timestamps: cfg.ui.timestamps,
    };

    let mut model = ui::Model::new(ui_options);
    model.run()
}
