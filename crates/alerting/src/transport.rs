//! 알림 전송 -- 액션 종류별 전송 구현과 액션 디스패처
//!
//! [`NotificationTransport`]는 액션 하나를 전송하는 dyn 호환 trait입니다.
//! [`DefaultTransport`]는 console(tracing), webhook/chat hook(HTTP JSON), email(SMTP)을 지원합니다.
//! [`ActionDispatcher`]는 액션마다 독립된 태스크를 띄워 타임아웃과 함께 실행합니다.

use std::sync::Arc;
use std::time::Duration;

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use logwarden_core::metrics as m;
use logwarden_core::pipeline::BoxFuture;
use tokio::task::JoinHandle;

use crate::alert::AlertNotification;
use crate::config::SmtpSettings;
use crate::error::AlertingError;
use crate::rule::AlertAction;

/// 알림 액션 전송기
pub trait NotificationTransport: Send + Sync {
    /// 액션 하나를 전송합니다.
    fn send<'a>(
        &'a self,
        action: &'a AlertAction,
        notification: &'a AlertNotification,
    ) -> BoxFuture<'a, Result<(), AlertingError>>;
}

struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

/// 기본 전송 구현
pub struct DefaultTransport {
    client: reqwest::Client,
    mailer: Option<Mailer>,
}

impl DefaultTransport {
    /// 전송기를 생성합니다. SMTP 설정이 없으면 이메일 액션은 실패로 처리됩니다.
    pub fn new(smtp: Option<&SmtpSettings>, timeout: Duration) -> Result<Self, AlertingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AlertingError::Config {
                field: "http_client".to_owned(),
                reason: e.to_string(),
            })?;
        let mailer = smtp.map(|s| Self::build_mailer(s, timeout)).transpose()?;
        Ok(Self { client, mailer })
    }

    fn build_mailer(settings: &SmtpSettings, timeout: Duration) -> Result<Mailer, AlertingError> {
        let smtp_err = |reason: String| AlertingError::Config {
            field: "smtp".to_owned(),
            reason,
        };
        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|e: lettre::address::AddressError| smtp_err(e.to_string()))?;

        let mut builder = if settings.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| smtp_err(e.to_string()))?
                .port(settings.port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
                .port(settings.port)
        };
        if !settings.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ));
        }

        Ok(Mailer {
            transport: builder.timeout(Some(timeout)).build(),
            from,
        })
    }

    async fn post_json(
        &self,
        kind: &str,
        url: &str,
        headers: impl Iterator<Item = (&String, &String)>,
        body: &serde_json::Value,
    ) -> Result<(), AlertingError> {
        let action_err = |reason: String| AlertingError::Action {
            action: kind.to_owned(),
            reason,
        };
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await.map_err(|e| action_err(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(action_err(format!("{url} returned {status}")));
        }
        Ok(())
    }

    async fn send_email(
        &self,
        to: &[String],
        subject_prefix: Option<&str>,
        notification: &AlertNotification,
    ) -> Result<(), AlertingError> {
        let email_err = |reason: String| AlertingError::Action {
            action: "email".to_owned(),
            reason,
        };
        let mailer = self
            .mailer
            .as_ref()
            .ok_or_else(|| email_err("smtp is not configured".to_owned()))?;

        let alert = notification.alert();
        let subject = format!("{}{}", subject_prefix.unwrap_or(""), alert.summary());
        let body = serde_json::to_string_pretty(notification)
            .map_err(|e| email_err(e.to_string()))?;

        let mut builder = Message::builder().from(mailer.from.clone());
        for addr in to {
            let mailbox: Mailbox = addr
                .parse()
                .map_err(|e: lettre::address::AddressError| email_err(e.to_string()))?;
            builder = builder.to(mailbox);
        }
        let message = builder
            .subject(subject)
            .body(format!("{}\n\n{body}", alert.summary()))
            .map_err(|e| email_err(e.to_string()))?;

        mailer
            .transport
            .send(message)
            .await
            .map_err(|e| email_err(e.to_string()))?;
        Ok(())
    }

    async fn deliver(
        &self,
        action: &AlertAction,
        notification: &AlertNotification,
    ) -> Result<(), AlertingError> {
        match action {
            AlertAction::Console => {
                log_to_console(notification);
                Ok(())
            }
            AlertAction::Webhook { url, headers } => {
                let body = serde_json::to_value(notification).map_err(|e| {
                    AlertingError::Action {
                        action: "webhook".to_owned(),
                        reason: e.to_string(),
                    }
                })?;
                self.post_json("webhook", url, headers.iter(), &body).await
            }
            AlertAction::ChatHook { url, channel } => {
                let body = chat_payload(notification, channel.as_deref());
                self.post_json("chat_hook", url, std::iter::empty(), &body)
                    .await
            }
            AlertAction::Email { to, subject_prefix } => {
                self.send_email(to, subject_prefix.as_deref(), notification)
                    .await
            }
        }
    }
}

impl NotificationTransport for DefaultTransport {
    fn send<'a>(
        &'a self,
        action: &'a AlertAction,
        notification: &'a AlertNotification,
    ) -> BoxFuture<'a, Result<(), AlertingError>> {
        Box::pin(self.deliver(action, notification))
    }
}

fn log_to_console(notification: &AlertNotification) {
    let alert = notification.alert();
    match notification {
        AlertNotification::Fired(_) => tracing::warn!(
            alert_id = %alert.id,
            rule_id = %alert.rule_id,
            severity = alert.severity.as_str(),
            value = alert.value,
            threshold = alert.threshold,
            "ALERT FIRED: {}",
            alert.rule_name
        ),
        AlertNotification::StillFiring(_) => tracing::warn!(
            alert_id = %alert.id,
            rule_id = %alert.rule_id,
            severity = alert.severity.as_str(),
            value = alert.value,
            "ALERT STILL FIRING: {}",
            alert.rule_name
        ),
        AlertNotification::Resolved(_) => tracing::info!(
            alert_id = %alert.id,
            rule_id = %alert.rule_id,
            value = alert.value,
            "ALERT RESOLVED: {}",
            alert.rule_name
        ),
    }
}

/// chat incoming webhook 요청 본문
pub fn chat_payload(notification: &AlertNotification, channel: Option<&str>) -> serde_json::Value {
    let alert = notification.alert();
    let mut payload = serde_json::json!({
        "text": alert.summary(),
        "event": notification.kind(),
        "alert_id": alert.id,
        "rule_id": alert.rule_id,
    });
    if let Some(channel) = channel {
        payload["channel"] = serde_json::Value::String(channel.to_owned());
    }
    payload
}

/// 액션 디스패처
///
/// 액션마다 태스크를 띄우고 즉시 반환하므로 느린 액션이 평가 루프를 막지 않습니다.
#[derive(Clone)]
pub struct ActionDispatcher {
    transport: Arc<dyn NotificationTransport>,
    timeout: Duration,
}

impl ActionDispatcher {
    /// 디스패처를 생성합니다.
    pub fn new(transport: Arc<dyn NotificationTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// 액션들을 각각 독립된 태스크로 실행합니다.
    ///
    /// 실패와 타임아웃은 태스크 안에서 로그와 메트릭으로 기록됩니다.
    /// 반환된 핸들은 기다리지 않아도 됩니다.
    pub fn dispatch(
        &self,
        actions: Vec<AlertAction>,
        notification: &AlertNotification,
    ) -> Vec<JoinHandle<bool>> {
        actions
            .into_iter()
            .map(|action| {
                let transport = Arc::clone(&self.transport);
                let notification = notification.clone();
                let timeout = self.timeout;
                tokio::spawn(async move {
                    let kind = action.kind_name();
                    let alert_id = notification.alert().id.clone();
                    let outcome =
                        tokio::time::timeout(timeout, transport.send(&action, &notification)).await;
                    match outcome {
                        Ok(Ok(())) => {
                            tracing::debug!(action = kind, alert_id = %alert_id, "alert action delivered");
                            true
                        }
                        Ok(Err(e)) => {
                            metrics::counter!(m::ALERTING_ACTION_FAILURES_TOTAL, m::LABEL_ACTION => kind)
                                .increment(1);
                            tracing::warn!(action = kind, alert_id = %alert_id, error = %e, "alert action failed");
                            false
                        }
                        Err(_elapsed) => {
                            metrics::counter!(m::ALERTING_ACTION_FAILURES_TOTAL, m::LABEL_ACTION => kind)
                                .increment(1);
                            tracing::warn!(
                                action = kind,
                                alert_id = %alert_id,
                                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                                "alert action timed out"
                            );
                            false
                        }
                    }
                })
            })
            .collect()
    }
}
