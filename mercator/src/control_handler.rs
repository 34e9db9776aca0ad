//! Control command handler wiring the control socket to the running delivery processor.

use std::{collections::HashMap, sync::Arc, time::Instant};

use async_trait::async_trait;
use mercator_common::{Context, DeliveryStatus};
use mercator_control::{
    ControlError, DnsCommand, QueueCommand, Request, RequestCommand, Response, SystemCommand,
    protocol::ResponseData, server::CommandHandler,
};
use mercator_delivery::DeliveryQueryService;
use mercator_spool::{BackingStore, SpooledMessageId};

/// Dispatches control requests against a running delivery processor.
pub struct MercatorControlHandler {
    delivery: Arc<dyn DeliveryQueryService>,
    start_time: Instant,
}

impl MercatorControlHandler {
    #[must_use]
    pub fn new(delivery: Arc<dyn DeliveryQueryService>) -> Self {
        Self {
            delivery,
            start_time: Instant::now(),
        }
    }
}

#[cfg(unix)]
fn caller_uid() -> String {
    unsafe { libc::getuid() }.to_string()
}

#[cfg(not(unix))]
fn caller_uid() -> String {
    "N/A".to_string()
}

fn status_filter_name(status: &DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Pending => "pending",
        DeliveryStatus::InProgress => "inprogress",
        DeliveryStatus::Completed => "completed",
        DeliveryStatus::Failed(_) => "failed",
        DeliveryStatus::Retry { .. } => "retry",
        DeliveryStatus::Expired => "expired",
    }
}

#[async_trait]
impl CommandHandler for MercatorControlHandler {
    async fn handle_request(&self, request: Request) -> mercator_control::Result<Response> {
        if !request.is_version_compatible() {
            return Err(ControlError::ServerError(format!(
                "Incompatible protocol version: client={}, server={}",
                request.version,
                mercator_control::PROTOCOL_VERSION
            )));
        }

        match request.command {
            RequestCommand::Dns(dns_cmd) => self.handle_dns_command(dns_cmd).await,
            RequestCommand::System(sys_cmd) => self.handle_system_command(&sys_cmd).await,
            RequestCommand::Queue(queue_cmd) => self.handle_queue_command(queue_cmd).await,
        }
    }
}

impl MercatorControlHandler {
    async fn handle_dns_command(&self, command: DnsCommand) -> mercator_control::Result<Response> {
        let uid = caller_uid();
        let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());

        tracing::event!(
            tracing::Level::INFO,
            user = %user,
            uid = %uid,
            command = ?command,
            "Control command: DNS"
        );

        let Some(resolver) = self.delivery.dns_resolver().as_ref() else {
            tracing::event!(tracing::Level::WARN,
                user = %user,
                uid = %uid,
                command = ?command,
                "DNS command failed: resolver not initialized"
            );
            return Err(ControlError::ServerError(
                "DNS resolver not initialized".to_string(),
            ));
        };

        let result = match command {
            DnsCommand::ListCache => {
                let cache = resolver.list_cache().await;

                let cache_data: HashMap<String, Vec<mercator_control::protocol::CachedMailServer>> =
                    cache
                        .into_iter()
                        .map(|(domain, servers)| {
                            let servers = servers
                                .into_iter()
                                .map(|(server, ttl)| mercator_control::protocol::CachedMailServer {
                                    host: server.host,
                                    priority: server.priority,
                                    port: server.port,
                                    ttl_remaining_secs: ttl.as_secs(),
                                })
                                .collect();
                            (domain, servers)
                        })
                        .collect();

                Ok(Response::data(ResponseData::DnsCache(cache_data)))
            }

            DnsCommand::ClearCache => {
                resolver.clear_cache().await;
                Ok(Response::ok())
            }

            DnsCommand::RefreshDomain(domain) => match resolver.refresh_domain(&domain).await {
                Ok(servers) => {
                    let message = format!(
                        "Refreshed DNS for {domain}: {} mail server(s)",
                        servers.len()
                    );
                    Ok(Response::data(ResponseData::Message(message)))
                }
                Err(e) => Err(ControlError::ServerError(format!(
                    "Failed to refresh domain {domain}: {e}"
                ))),
            },

            DnsCommand::SetOverride { domain, mx_server } => {
                self.update_mx_override(&domain, Some(&mx_server));
                let message = format!("Set MX override for {domain} -> {mx_server}");
                Ok(Response::data(ResponseData::Message(message)))
            }

            DnsCommand::RemoveOverride(domain) => {
                self.update_mx_override(&domain, None);
                let message = format!("Removed MX override for {domain}");
                Ok(Response::data(ResponseData::Message(message)))
            }

            DnsCommand::ListOverrides => {
                let overrides = self.list_mx_overrides();
                Ok(Response::data(ResponseData::MxOverrides(overrides)))
            }
        };

        match &result {
            Ok(_) => tracing::event!(tracing::Level::INFO, user = %user, uid = %uid, "DNS command completed successfully"),
            Err(e) => tracing::event!(tracing::Level::WARN, user = %user, uid = %uid, error = %e, "DNS command failed"),
        }

        result
    }

    async fn handle_system_command(
        &self,
        command: &SystemCommand,
    ) -> mercator_control::Result<Response> {
        let uid = caller_uid();
        let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());

        tracing::event!(
            tracing::Level::INFO,
            user = %user,
            uid = %uid,
            command = ?command,
            "Control command: System"
        );

        let result = match command {
            SystemCommand::Ping => Ok(Response::ok()),

            SystemCommand::Status => {
                let uptime_secs = self.start_time.elapsed().as_secs();

                let dns_cache_entries = match self.delivery.dns_resolver().as_ref() {
                    Some(resolver) => resolver.cache_stats().await.total_entries,
                    None => 0,
                };

                let status = mercator_control::protocol::SystemStatus {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    uptime_secs,
                    queue_size: self.delivery.queue_len(),
                    dns_cache_entries,
                };

                Ok(Response::data(ResponseData::SystemStatus(status)))
            }
        };

        match &result {
            Ok(_) => tracing::event!(tracing::Level::INFO, user = %user, uid = %uid, "System command completed successfully"),
            Err(e) => tracing::event!(tracing::Level::WARN, user = %user, uid = %uid, error = %e, "System command failed"),
        }

        result
    }

    async fn handle_queue_command(
        &self,
        command: QueueCommand,
    ) -> mercator_control::Result<Response> {
        let uid = caller_uid();
        let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());

        tracing::event!(
            tracing::Level::INFO,
            user = %user,
            uid = %uid,
            command = ?command,
            "Control command: Queue"
        );

        let Some(spool) = self.delivery.spool().as_ref() else {
            tracing::event!(tracing::Level::WARN,
                user = %user,
                uid = %uid,
                command = ?command,
                "Queue command failed: spool not initialized"
            );
            return Err(ControlError::ServerError(
                "Spool not initialized".to_string(),
            ));
        };

        let result = match command {
            QueueCommand::List { status_filter } => {
                self.handle_list_command(spool, status_filter).await
            }
            QueueCommand::View { message_id } => self.handle_view_command(spool, message_id).await,
            QueueCommand::Retry { message_id, force } => self.handle_retry_command(&message_id, force),
            QueueCommand::Delete { message_id } => {
                self.handle_delete_command(spool, message_id).await
            }
            QueueCommand::Stats => Ok(self.handle_stats_command()),
        };

        match &result {
            Ok(_) => tracing::event!(tracing::Level::INFO, user = %user, uid = %uid, "Queue command completed successfully"),
            Err(e) => tracing::event!(tracing::Level::WARN, user = %user, uid = %uid, error = %e, "Queue command failed"),
        }

        result
    }

    async fn handle_list_command(
        &self,
        spool: &Arc<dyn BackingStore>,
        status_filter: Option<String>,
    ) -> mercator_control::Result<Response> {
        let all_info = self.delivery.list_messages(None);

        let filtered_info: Vec<_> = if let Some(status) = status_filter {
            all_info
                .into_iter()
                .filter(|info| status_filter_name(&info.status).eq_ignore_ascii_case(&status))
                .collect()
        } else {
            all_info
        };

        let mut messages = Vec::new();
        for info in filtered_info {
            let Ok(context) = spool.read(&info.message_id).await else {
                continue;
            };

            let message = mercator_control::protocol::QueueMessage {
                id: info.message_id.to_string(),
                from: context.sender(),
                to: context.recipients(),
                domain: info.recipient_domain.to_string(),
                status: status_filter_name(&info.status).to_string(),
                attempts: info.attempt_count(),
                next_retry: info
                    .next_retry_at
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs()),
                size: context.data.as_ref().map_or(0, |d| d.len()),
                spooled_at: info.message_id.timestamp_ms() / 1000,
            };
            messages.push(message);
        }

        Ok(Response::data(ResponseData::QueueList(messages)))
    }

    async fn handle_view_command(
        &self,
        spool: &Arc<dyn BackingStore>,
        message_id: String,
    ) -> mercator_control::Result<Response> {
        let msg_id = SpooledMessageId::from_filename(&format!("{message_id}.bin"))
            .ok_or_else(|| ControlError::ServerError(format!("Invalid message ID: {message_id}")))?;

        let info = self.delivery.get_message(&msg_id).ok_or_else(|| {
            ControlError::ServerError(format!("Message not found in queue: {message_id}"))
        })?;

        let context = spool
            .read(&msg_id)
            .await
            .map_err(|e| ControlError::ServerError(format!("Failed to read message: {e}")))?;

        let headers = Self::extract_headers(&context);
        let body_preview = Self::extract_body_preview(&context);

        let details = mercator_control::protocol::QueueMessageDetails {
            id: message_id,
            from: context.sender(),
            to: context.recipients(),
            domain: info.recipient_domain.to_string(),
            status: format!("{:?}", info.status),
            attempts: info.attempt_count(),
            next_retry: info
                .next_retry_at
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs()),
            last_error: info.attempts.last().and_then(|a| a.error.clone()),
            size: context.data.as_ref().map_or(0, |d| d.len()),
            spooled_at: msg_id.timestamp_ms() / 1000,
            headers,
            body_preview,
        };

        Ok(Response::data(ResponseData::QueueMessageDetails(details)))
    }

    fn handle_retry_command(
        &self,
        message_id: &str,
        force: bool,
    ) -> mercator_control::Result<Response> {
        let msg_id = SpooledMessageId::from_filename(&format!("{message_id}.bin"))
            .ok_or_else(|| ControlError::ServerError(format!("Invalid message ID: {message_id}")))?;

        let info = self.delivery.get_message(&msg_id).ok_or_else(|| {
            ControlError::ServerError(format!("Message not found in queue: {message_id}"))
        })?;

        if !force && !matches!(info.status, DeliveryStatus::Failed(_)) {
            return Err(ControlError::ServerError(format!(
                "Message is not in failed status (current: {:?}). Use --force to retry anyway.",
                info.status
            )));
        }

        self.delivery.update_status(&msg_id, DeliveryStatus::Pending);
        self.delivery.reset_server_index(&msg_id);
        self.delivery
            .set_next_retry_at(&msg_id, std::time::SystemTime::UNIX_EPOCH);

        Ok(Response::data(ResponseData::Message(format!(
            "Message {message_id} scheduled for retry"
        ))))
    }

    async fn handle_delete_command(
        &self,
        spool: &Arc<dyn BackingStore>,
        message_id: String,
    ) -> mercator_control::Result<Response> {
        let msg_id = SpooledMessageId::from_filename(&format!("{message_id}.bin"))
            .ok_or_else(|| ControlError::ServerError(format!("Invalid message ID: {message_id}")))?;

        self.delivery.remove(&msg_id).ok_or_else(|| {
            ControlError::ServerError(format!("Message not found in queue: {message_id}"))
        })?;

        spool.delete(&msg_id).await.map_err(|e| {
            ControlError::ServerError(format!("Failed to delete message from spool: {e}"))
        })?;

        Ok(Response::data(ResponseData::Message(format!(
            "Message {message_id} deleted"
        ))))
    }

    fn handle_stats_command(&self) -> Response {
        let all_info = self.delivery.list_messages(None);

        let mut by_status: HashMap<String, usize> = HashMap::new();
        for info in &all_info {
            *by_status
                .entry(status_filter_name(&info.status).to_string())
                .or_insert(0) += 1;
        }

        let mut by_domain: HashMap<String, usize> = HashMap::new();
        for info in &all_info {
            *by_domain.entry(info.recipient_domain.to_string()).or_insert(0) += 1;
        }

        let now_ms = u64::try_from(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
        )
        .unwrap_or_default();

        let oldest_age = all_info
            .iter()
            .map(|info| (now_ms.saturating_sub(info.message_id.timestamp_ms())) / 1000)
            .max();

        let stats = mercator_control::protocol::QueueStats {
            total: all_info.len(),
            by_status,
            by_domain,
            oldest_message_age_secs: oldest_age,
        };

        Response::data(ResponseData::QueueStats(stats))
    }

    fn extract_headers(context: &Context) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        if let Some(data) = &context.data
            && let Ok(data_str) = std::str::from_utf8(data.as_ref())
        {
            for line in data_str.lines() {
                if line.is_empty() {
                    break;
                }
                if let Some((key, value)) = line.split_once(':') {
                    headers.insert(key.trim().to_string(), value.trim().to_string());
                }
            }
        }
        headers
    }

    fn extract_body_preview(context: &Context) -> String {
        context.data.as_ref().map_or_else(
            || "[No data]".to_string(),
            |data| {
                std::str::from_utf8(data.as_ref()).map_or_else(
                    |_| "[Binary data]".to_string(),
                    |data_str| {
                        data_str
                            .find("\r\n\r\n")
                            .or_else(|| data_str.find("\n\n"))
                            .map_or_else(
                                || data_str.chars().take(1024).collect(),
                                |body_start| {
                                    let offset = if data_str[body_start..].starts_with("\r\n\r\n") {
                                        4
                                    } else {
                                        2
                                    };
                                    data_str[body_start + offset..].chars().take(1024).collect()
                                },
                            )
                    },
                )
            },
        )
    }

    /// Updates a domain's MX override at runtime.
    ///
    /// Not persisted: survives until the next config reload or restart.
    fn update_mx_override(&self, domain: &str, mx_override: Option<&String>) {
        let registry = self.delivery.domains();
        let mut config = registry.get(domain).unwrap_or_default();
        config.mx_override = mx_override.cloned();
        registry.insert(domain.to_string(), config);

        tracing::event!(
            tracing::Level::INFO,
            domain = %domain,
            mx_override = ?mx_override,
            "Updated MX override for domain at runtime"
        );
    }

    fn list_mx_overrides(&self) -> HashMap<String, String> {
        self.delivery
            .domains()
            .iter()
            .filter_map(|(domain, config)| config.mx_override.map(|mx| (domain, mx)))
            .collect()
    }
}
