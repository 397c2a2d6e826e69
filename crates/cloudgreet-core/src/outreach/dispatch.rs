//! Channel Dispatchers - hand rendered steps to email and telephony providers

use async_trait::async_trait;
use chrono::Utc;
use cloudgreet_common::config::{DispatchConfig, GatewayConfig, SmtpRelayConfig};
use cloudgreet_common::types::{Channel, SendId};
use cloudgreet_common::{Error, Result};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, info};
use uuid::Uuid;

/// A rendered step ready to leave the system
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub send_id: SendId,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    /// Call length ceiling from the tenant's AI settings
    pub max_call_minutes: Option<i32>,
}

/// Provider acknowledgement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub provider_id: Option<String>,
}

/// Outbound transport for one channel
#[async_trait]
pub trait ChannelDispatcher: Send + Sync {
    /// Deliver the message to the provider
    async fn dispatch(&self, message: &OutboundMessage) -> Result<DispatchReceipt>;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// Email over an SMTP relay
///
/// The transport is built once and pools its relay connections.
pub struct SmtpDispatcher {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    hostname: String,
}

impl SmtpDispatcher {
    pub fn new(config: &SmtpRelayConfig, hostname: impl Into<String>) -> Result<Self> {
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e| Error::Config(format!("Invalid SMTP from address: {}", e)))?;

        let mut transport = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| Error::Config(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        }
        .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            transport = transport.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            mailer: transport.timeout(Some(StdDuration::from_secs(30))).build(),
            from,
            hostname: hostname.into(),
        })
    }

    fn build_message(&self, message: &OutboundMessage, msg_id: &str) -> Result<Message> {
        let to: Mailbox = message
            .recipient
            .parse()
            .map_err(|e| Error::Dispatch(format!("Invalid to address: {}", e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .message_id(Some(msg_id.to_string()))
            .subject(message.subject.clone().unwrap_or_default())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| Error::Dispatch(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl ChannelDispatcher for SmtpDispatcher {
    async fn dispatch(&self, message: &OutboundMessage) -> Result<DispatchReceipt> {
        let msg_id = format!(
            "<{}.{}@{}>",
            message.send_id,
            Utc::now().timestamp(),
            self.hostname
        );
        let email = self.build_message(message, &msg_id)?;

        let response = self
            .mailer
            .send(email)
            .await
            .map_err(|e| Error::Dispatch(format!("SMTP send failed: {}", e)))?;
        debug!("Email accepted by relay: {:?}", response.code());

        Ok(DispatchReceipt {
            provider_id: Some(msg_id),
        })
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

#[derive(Debug, Serialize)]
struct GatewaySms<'a> {
    from: &'a str,
    to: &'a str,
    text: &'a str,
    reference: String,
}

#[derive(Debug, Serialize)]
struct GatewayCall<'a> {
    from: &'a str,
    to: &'a str,
    greeting: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_duration_minutes: Option<i32>,
    reference: String,
}

/// SMS and calls through an HTTP telephony gateway
pub struct GatewayDispatcher {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl GatewayDispatcher {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Dispatch(format!("Failed to build gateway client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, channel: Channel) -> String {
        let base = self.config.url.trim_end_matches('/');
        match channel {
            Channel::Call => format!("{}/calls", base),
            _ => format!("{}/sms", base),
        }
    }
}

#[async_trait]
impl ChannelDispatcher for GatewayDispatcher {
    async fn dispatch(&self, message: &OutboundMessage) -> Result<DispatchReceipt> {
        let reference = message.send_id.to_string();
        let request = self.client.post(self.endpoint(message.channel));
        let request = match message.channel {
            Channel::Call => request.json(&GatewayCall {
                from: &self.config.from_number,
                to: &message.recipient,
                greeting: &message.body,
                max_duration_minutes: message.max_call_minutes,
                reference,
            }),
            _ => request.json(&GatewaySms {
                from: &self.config.from_number,
                to: &message.recipient,
                text: &message.body,
                reference,
            }),
        };
        let request = match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| Error::Dispatch(format!("Gateway request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Dispatch(format!(
                "Gateway returned {}: {}",
                status,
                body.trim()
            )));
        }

        let payload: serde_json::Value = response.json().await.unwrap_or_default();
        let provider_id = payload
            .get("id")
            .and_then(|id| match id {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        Ok(DispatchReceipt { provider_id })
    }

    fn name(&self) -> &'static str {
        "gateway"
    }
}

/// Dispatcher that only logs; used when no provider is configured
pub struct LogDispatcher;

#[async_trait]
impl ChannelDispatcher for LogDispatcher {
    async fn dispatch(&self, message: &OutboundMessage) -> Result<DispatchReceipt> {
        info!(
            send_id = %message.send_id,
            channel = %message.channel,
            recipient = %message.recipient,
            "Dispatch (log only)"
        );
        Ok(DispatchReceipt {
            provider_id: Some(format!("log-{}", Uuid::new_v4())),
        })
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Dispatcher per channel
#[derive(Clone)]
pub struct Dispatchers {
    pub email: Arc<dyn ChannelDispatcher>,
    pub sms: Arc<dyn ChannelDispatcher>,
    pub call: Arc<dyn ChannelDispatcher>,
}

impl Dispatchers {
    /// Build from configuration, falling back to logging for unconfigured
    /// channels
    pub fn from_config(config: &DispatchConfig, hostname: &str) -> Result<Self> {
        let email: Arc<dyn ChannelDispatcher> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpDispatcher::new(smtp, hostname)?),
            None => Arc::new(LogDispatcher),
        };
        let gateway: Arc<dyn ChannelDispatcher> = match &config.gateway {
            Some(gateway) => Arc::new(GatewayDispatcher::new(gateway.clone())?),
            None => Arc::new(LogDispatcher),
        };

        info!(
            email = email.name(),
            sms = gateway.name(),
            call = gateway.name(),
            "Channel dispatchers configured"
        );

        Ok(Self {
            email,
            sms: gateway.clone(),
            call: gateway,
        })
    }

    /// Log-only dispatchers for every channel
    pub fn logging() -> Self {
        Self {
            email: Arc::new(LogDispatcher),
            sms: Arc::new(LogDispatcher),
            call: Arc::new(LogDispatcher),
        }
    }

    pub fn for_channel(&self, channel: Channel) -> Arc<dyn ChannelDispatcher> {
        match channel {
            Channel::Email => self.email.clone(),
            Channel::Sms => self.sms.clone(),
            Channel::Call => self.call.clone(),
        }
    }
}
