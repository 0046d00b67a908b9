//! Message bodies for each notification channel.

use std::sync::LazyLock;

use chrono::Utc;
use pagewatch_core::models::Importance;
use pagewatch_core::notify::ChangeNotice;
use regex::Regex;
use serde_json::{Value, json};

static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("valid style regex"));
static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("valid script regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

fn detected_at(notice: &ChangeNotice) -> String {
    notice.detected_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn email_subject(notice: &ChangeNotice) -> String {
    format!("[Pagewatch] {} changed", notice.target_name)
}

/// Default HTML body used when the caller did not render one.
pub fn email_html(notice: &ChangeNotice) -> String {
    let name = escape_html(&notice.target_name);
    let url = escape_html(&notice.target_url);
    format!(
        r#"<div style="font-family: sans-serif; max-width: 600px;">
<h2>🔔 {name} changed</h2>
<p><strong>URL:</strong> <a href="{url}">{url}</a></p>
<p><strong>Importance:</strong> {importance}</p>
<p><strong>Detected at:</strong> {detected}</p>
<h3>Summary</h3>
<p>{summary}</p>
<p><a href="{url}">View page</a></p>
</div>"#,
        importance = notice.importance.label(),
        detected = detected_at(notice),
        summary = escape_html(&notice.summary),
    )
}

/// Plain-text alternative for an HTML email.
pub fn html_to_text(html: &str) -> String {
    let text = STYLE_BLOCK.replace_all(html, "");
    let text = SCRIPT_BLOCK.replace_all(&text, "");
    let text = TAG.replace_all(&text, "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

pub fn webhook(notice: &ChangeNotice) -> Value {
    json!({
        "event": "page_changed",
        "target": {
            "id": notice.target_id,
            "name": notice.target_name,
            "url": notice.target_url,
        },
        "change": {
            "id": notice.change_id,
            "importance": notice.importance,
            "summary": notice.summary,
            "detectedAt": notice.detected_at,
        },
        "timestamp": Utc::now(),
    })
}

pub fn feishu(notice: &ChangeNotice) -> Value {
    let template = match notice.importance {
        Importance::High => "red",
        Importance::Medium => "orange",
        Importance::Low => "blue",
    };
    json!({
        "msg_type": "interactive",
        "card": {
            "config": { "wide_screen_mode": true },
            "header": {
                "title": { "tag": "plain_text", "content": format!("🔔 {} changed", notice.target_name) },
                "template": template,
            },
            "elements": [
                {
                    "tag": "div",
                    "text": { "tag": "lark_md", "content": format!("**Summary**\n{}", notice.summary) },
                },
                {
                    "tag": "div",
                    "fields": [
                        {
                            "is_short": true,
                            "text": { "tag": "lark_md", "content": format!("**Importance**\n{}", notice.importance.label()) },
                        },
                        {
                            "is_short": true,
                            "text": { "tag": "lark_md", "content": format!("**Detected at**\n{}", detected_at(notice)) },
                        },
                    ],
                },
                { "tag": "hr" },
                {
                    "tag": "action",
                    "actions": [{
                        "tag": "button",
                        "text": { "tag": "plain_text", "content": "View page" },
                        "url": notice.target_url,
                        "type": "primary",
                    }],
                },
            ],
        },
    })
}

pub fn serverchan(notice: &ChangeNotice) -> Value {
    let title = format!("{} changed [{}]", notice.target_name, notice.importance.label());
    let desp = [
        format!("## {}", notice.target_name),
        String::new(),
        format!("**URL:** [{0}]({0})", notice.target_url),
        String::new(),
        format!("**Importance:** {}", notice.importance.label()),
        String::new(),
        format!("**Detected at:** {}", detected_at(notice)),
        String::new(),
        "### Summary".to_string(),
        notice.summary.clone(),
        String::new(),
        "---".to_string(),
        "*Sent by Pagewatch*".to_string(),
    ]
    .join("\n");
    json!({ "title": title, "desp": desp })
}

pub fn wecom(notice: &ChangeNotice) -> Value {
    let color = match notice.importance {
        Importance::High => "red",
        Importance::Medium => "orange",
        Importance::Low => "grey",
    };
    let content = [
        format!(
            "🔔 <font color=\"{color}\">**{} changed**</font>",
            notice.target_name
        ),
        format!("> Importance: {}", notice.importance.label()),
        format!("> Detected at: {}", detected_at(notice)),
        String::new(),
        notice.summary.clone(),
        String::new(),
        format!("[View page]({})", notice.target_url),
    ]
    .join("\n");
    json!({ "msgtype": "markdown", "markdown": { "content": content } })
}

pub fn telegram(chat_id: &str, notice: &ChangeNotice) -> Value {
    let text = format!(
        "🔔 <b>{name} changed</b>\n\n{summary}\n\nImportance: {importance}\nDetected at: {detected}\n\n<a href=\"{url}\">View page</a>",
        name = escape_html(&notice.target_name),
        summary = escape_html(&notice.summary),
        importance = notice.importance.label(),
        detected = detected_at(notice),
        url = escape_html(&notice.target_url),
    );
    json!({ "chat_id": chat_id, "text": text, "parse_mode": "HTML" })
}

pub fn discord(notice: &ChangeNotice) -> Value {
    json!({
        "embeds": [{
            "title": format!("🔔 {} changed", notice.target_name),
            "description": notice.summary,
            "url": notice.target_url,
            "color": notice.importance.color(),
            "fields": [
                { "name": "Importance", "value": notice.importance.label(), "inline": true },
                { "name": "Detected at", "value": detected_at(notice), "inline": true },
            ],
            "footer": { "text": "Pagewatch" },
            "timestamp": notice.detected_at,
        }],
    })
}
