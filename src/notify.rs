//! Telegram Bot API notifications.
//!
//! Delivery is best-effort: callers hand the text over and move on, failures
//! are logged and never reach the request that triggered them.

use std::time::Duration;

use anyhow::Context;
use serde::Serialize;

use crate::{
    config::TelegramConfig,
    dto::contact::ContactRequest,
    models::{Order, OrderItem},
};

#[derive(Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        }
    }

    pub async fn send(&self, text: &str) -> anyhow::Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        self.client
            .post(url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
                parse_mode: "HTML",
                disable_web_page_preview: true,
            })
            .send()
            .await
            .context("telegram request failed")?
            .error_for_status()
            .context("telegram rejected message")?;
        Ok(())
    }

    pub fn notify_in_background(&self, text: String) {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.send(&text).await {
                tracing::warn!(error = ?err, "telegram notification failed");
            }
        });
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn order_message(order: &Order, items: &[OrderItem]) -> String {
    let mut text = format!(
        "<b>New order {}</b>\nCustomer: {}\nPhone: {}\nDelivery: {}\nPayment: {}\n",
        escape_html(&order.order_number),
        escape_html(&order.customer_name),
        escape_html(&order.phone),
        escape_html(&order.delivery_method),
        escape_html(&order.payment_method),
    );
    if let Some(address) = order.address.as_deref().filter(|a| !a.is_empty()) {
        text.push_str(&format!("Address: {}\n", escape_html(address)));
    }
    text.push('\n');
    for item in items {
        text.push_str(&format!(
            "• {} ({}) × {} = {}\n",
            escape_html(&item.product_name),
            escape_html(&item.article),
            item.quantity,
            item.line_total()
        ));
    }
    text.push_str(&format!("\n<b>Total: {}</b>", order.total_amount));
    if let Some(comment) = order.comment.as_deref().filter(|c| !c.is_empty()) {
        text.push_str(&format!("\nComment: {}", escape_html(comment)));
    }
    text
}

pub fn contact_message(request: &ContactRequest) -> String {
    let mut text = format!("<b>Contact form</b>\nName: {}\n", escape_html(&request.name));
    if let Some(phone) = request.phone.as_deref() {
        text.push_str(&format!("Phone: {}\n", escape_html(phone)));
    }
    if let Some(email) = request.email.as_deref() {
        text.push_str(&format!("Email: {}\n", escape_html(email)));
    }
    text.push_str(&format!("\n{}", escape_html(&request.message)));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn order() -> Order {
        Order {
            id: Uuid::new_v4(),
            order_number: "FS-123456".into(),
            user_id: Uuid::new_v4(),
            customer_name: "Anna <script>".into(),
            phone: "+7 900 000-00-00".into(),
            address: Some("Main st. 1".into()),
            delivery_method: "courier".into(),
            payment_method: "card".into(),
            total_amount: 2900,
            status: "pending".into(),
            tracking_number: None,
            comment: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn item(name: &str, price: i64, quantity: i32) -> OrderItem {
        OrderItem {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Some(Uuid::new_v4()),
            product_name: name.into(),
            article: format!("ART-{name}"),
            category_name: None,
            price,
            quantity,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[test]
    fn order_message_lists_lines_and_total() {
        let text = order_message(&order(), &[item("Linen", 850, 2), item("Silk", 1200, 1)]);
        assert!(text.contains("FS-123456"));
        assert!(text.contains("Linen (ART-Linen) × 2 = 1700"));
        assert!(text.contains("Silk (ART-Silk) × 1 = 1200"));
        assert!(text.contains("<b>Total: 2900</b>"));
        assert!(text.contains("Anna &lt;script&gt;"));
        assert!(text.contains("Address: Main st. 1"));
    }

    #[test]
    fn contact_message_skips_missing_fields() {
        let text = contact_message(&ContactRequest {
            name: "Oleg".into(),
            phone: None,
            email: Some("oleg@example.com".into()),
            message: "Do you have velvet?".into(),
        });
        assert!(!text.contains("Phone:"));
        assert!(text.contains("Email: oleg@example.com"));
        assert!(text.ends_with("Do you have velvet?"));
    }
}
