use anyhow::{anyhow, bail, Context, Result};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

const MAX_RETRIES: u32 = 3;

/// Send the HTML digest over SMTP (STARTTLS). Credentials come from
/// `GMAIL_USER`/`GMAIL_APP_PASSWORD`. Three attempts with exponential
/// backoff; exhausting them is a run failure.
pub async fn send_email(
    relay: &str,
    subject: &str,
    html_body: &str,
    recipient: &str,
) -> Result<()> {
    let user = std::env::var("GMAIL_USER").unwrap_or_default();
    let password = std::env::var("GMAIL_APP_PASSWORD").unwrap_or_default();
    if user.is_empty() || password.is_empty() {
        bail!("GMAIL_USER or GMAIL_APP_PASSWORD is not set");
    }

    let message = Message::builder()
        .from(user.parse().context("invalid sender address")?)
        .to(recipient.parse().context("invalid recipient address")?)
        .subject(subject)
        .header(ContentType::TEXT_HTML)
        .body(html_body.to_string())
        .context("building email message")?;

    let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(relay)
        .with_context(|| format!("configuring SMTP relay {}", relay))?
        .credentials(Credentials::new(user, password))
        .build();

    for attempt in 1..=MAX_RETRIES {
        match transport.send(message.clone()).await {
            Ok(_) => {
                info!("Email sent - recipient={}, attempt={}", recipient, attempt);
                return Ok(());
            }
            Err(e) => {
                warn!(
                    "Email send failed (attempt {}/{}) - {}",
                    attempt, MAX_RETRIES, e
                );
                if attempt < MAX_RETRIES {
                    let wait = 2u64.pow(attempt);
                    info!("Retrying email in {}s", wait);
                    sleep(Duration::from_secs(wait)).await;
                }
            }
        }
    }

    Err(anyhow!(
        "email delivery failed after {} attempts to {}",
        MAX_RETRIES,
        recipient
    ))
}
