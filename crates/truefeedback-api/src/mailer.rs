use anyhow::{Result, anyhow};
use serde::Serialize;
use tracing::{info, warn};

/// Delivery channel for verification codes.
#[derive(Clone)]
pub enum Mailer {
    /// Development mode: the code goes to the log instead of an inbox.
    Log,
    /// Resend transactional email API.
    Resend {
        client: reqwest::Client,
        api_url: String,
        api_key: String,
        from: String,
    },
}

#[derive(Debug, Serialize)]
struct ResendEmailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: String,
    text: String,
}

impl Mailer {
    pub fn resend(api_url: String, api_key: String, from: String) -> Self {
        Mailer::Resend {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            from,
        }
    }

    pub async fn send_verification(&self, email: &str, username: &str, code: &str) -> Result<()> {
        match self {
            Mailer::Log => {
                warn!(%email, %username, %code, "Mail delivery disabled, logging verification code");
                Ok(())
            }
            Mailer::Resend {
                client,
                api_url,
                api_key,
                from,
            } => {
                let body = ResendEmailBody {
                    from,
                    to: [email],
                    subject: "TrueFeedback | Verification code",
                    html: verification_html(username, code),
                    text: verification_text(username, code),
                };

                let resp = client
                    .post(api_url.as_str())
                    .bearer_auth(api_key)
                    .json(&body)
                    .send()
                    .await?;

                let status = resp.status();
                if status.is_success() {
                    info!(%email, "Verification email sent");
                    return Ok(());
                }

                let text = resp.text().await.unwrap_or_default();
                Err(anyhow!("Resend send failed (status={status}): {text}"))
            }
        }
    }
}

fn verification_text(username: &str, code: &str) -> String {
    format!(
        "Hello {username},\n\n\
         Thank you for registering. Use the following code to verify your email address:\n\n\
         {code}\n\n\
         The code expires in one hour. If you did not request this, you can ignore this email.\n"
    )
}

fn verification_html(username: &str, code: &str) -> String {
    let username = escape_html(username);
    format!(
        "<!DOCTYPE html><html lang=\"en\"><body style=\"font-family: Arial, sans-serif; padding: 20px\">\
         <h2>Hello {username},</h2>\
         <p>Thank you for registering. Use the following code to verify your email address:</p>\
         <p style=\"font-size: 24px; font-weight: bold; letter-spacing: 4px\">{code}</p>\
         <p>The code expires in one hour. If you did not request this, you can ignore this email.</p>\
         </body></html>"
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
