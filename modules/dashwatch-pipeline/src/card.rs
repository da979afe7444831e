use chrono::Utc;
use serde_json::{json, Value};

use dashwatch_common::{
    is_placeholder, CommentRecord, ComplaintRecord, DailyReport, MetricStatus,
};

use crate::dispatch::BatchInfo;
use crate::parse::metrics::{SALES_NPS, SECTIONS};

/// The only two colors a card may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextColor {
    AlertRed,
    WarningAmber,
}

impl TextColor {
    pub fn hex(self) -> &'static str {
        match self {
            TextColor::AlertRed => "#d93025",
            TextColor::WarningAmber => "#f9ab00",
        }
    }

    pub fn for_status(status: MetricStatus) -> Option<Self> {
        match status {
            MetricStatus::Red => Some(TextColor::AlertRed),
            MetricStatus::Amber | MetricStatus::BelowRange => Some(TextColor::WarningAmber),
            MetricStatus::Green | MetricStatus::Unknown => None,
        }
    }
}

/// Escape text for the Chat card HTML subset. Newlines become `<br>`.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\n' => out.push_str("<br>"),
            c => out.push(c),
        }
    }
    out
}

/// User text with an optional color. Escaped when rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledText {
    pub text: String,
    pub color: Option<TextColor>,
}

impl StyledText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: None,
        }
    }

    pub fn colored(text: impl Into<String>, color: TextColor) -> Self {
        Self {
            text: text.into(),
            color: Some(color),
        }
    }

    fn render(&self) -> String {
        let escaped = html_escape(&self.text);
        match self.color {
            Some(color) => format!("<font color=\"{}\">{escaped}</font>", color.hex()),
            None => escaped,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Widget {
    KeyValue {
        label: String,
        text: StyledText,
        icon: Option<&'static str>,
    },
    /// Already-rendered HTML.
    Paragraph(String),
}

impl Widget {
    fn to_json(&self) -> Value {
        match self {
            Widget::KeyValue { label, text, icon } => {
                let mut decorated = json!({ "topLabel": label, "text": text.render() });
                if let Some(icon) = icon {
                    decorated["startIcon"] = json!({ "knownIcon": icon });
                }
                json!({ "decoratedText": decorated })
            }
            Widget::Paragraph(html) => json!({ "textParagraph": { "text": html } }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Section {
    header: Option<String>,
    widgets: Vec<Widget>,
}

/// A finished card. Sections with no widgets have already been dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    title: String,
    subtitle: Option<String>,
    sections: Vec<Section>,
}

impl Card {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn section_headers(&self) -> Vec<&str> {
        self.sections
            .iter()
            .filter_map(|s| s.header.as_deref())
            .collect()
    }

    pub fn widget_count(&self) -> usize {
        self.sections.iter().map(|s| s.widgets.len()).sum()
    }

    /// Render as a Google Chat `cardsV2` message.
    pub fn to_chat_payload(&self, card_id: &str) -> Value {
        let mut header = json!({ "title": self.title });
        if let Some(subtitle) = &self.subtitle {
            header["subtitle"] = json!(subtitle);
        }

        let sections: Vec<Value> = self
            .sections
            .iter()
            .map(|s| {
                let mut section = json!({
                    "widgets": s.widgets.iter().map(Widget::to_json).collect::<Vec<_>>()
                });
                if let Some(h) = &s.header {
                    section["header"] = json!(h);
                }
                section
            })
            .collect();

        json!({
            "cardsV2": [{
                "cardId": card_id,
                "card": { "header": header, "sections": sections }
            }]
        })
    }
}

/// Builds a [`Card`] one section at a time. Widgets go into the most recently
/// opened section.
#[derive(Debug, Clone)]
pub struct CardBuilder {
    card: Card,
}

impl CardBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            card: Card {
                title: title.into(),
                subtitle: None,
                sections: Vec::new(),
            },
        }
    }

    pub fn subtitle(mut self, subtitle: impl Into<String>) -> Self {
        let subtitle = subtitle.into();
        if !subtitle.trim().is_empty() {
            self.card.subtitle = Some(subtitle);
        }
        self
    }

    pub fn section(mut self, header: impl Into<String>) -> Self {
        self.card.sections.push(Section {
            header: Some(header.into()),
            widgets: Vec::new(),
        });
        self
    }

    /// Open a section without a header.
    pub fn untitled_section(mut self) -> Self {
        self.card.sections.push(Section::default());
        self
    }

    fn push(mut self, widget: Widget) -> Self {
        if self.card.sections.is_empty() {
            self.card.sections.push(Section::default());
        }
        if let Some(section) = self.card.sections.last_mut() {
            section.widgets.push(widget);
        }
        self
    }

    pub fn kv(self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.styled_kv(label, StyledText::plain(value))
    }

    pub fn styled_kv(self, label: impl Into<String>, text: StyledText) -> Self {
        self.push(Widget::KeyValue {
            label: label.into(),
            text,
            icon: None,
        })
    }

    pub fn icon_kv(
        self,
        label: impl Into<String>,
        value: impl Into<String>,
        icon: &'static str,
    ) -> Self {
        self.push(Widget::KeyValue {
            label: label.into(),
            text: StyledText::plain(value),
            icon: Some(icon),
        })
    }

    pub fn paragraph(self, text: &str) -> Self {
        self.push(Widget::Paragraph(html_escape(text)))
    }

    /// A bold heading line followed by the escaped text.
    pub fn headed_paragraph(self, heading: &str, text: &str) -> Self {
        self.push(Widget::Paragraph(format!(
            "<b>{}:</b><br>{}",
            html_escape(heading),
            html_escape(text)
        )))
    }

    pub fn build(mut self) -> Card {
        self.card.sections.retain(|s| !s.widgets.is_empty());
        self.card
    }
}

fn card_id(prefix: &str) -> String {
    format!("{prefix}_{}", Utc::now().timestamp())
}

// --- Comments ---

/// Detractor / Passive / Promoter band of an NPS score.
pub fn score_band(score: u8) -> (&'static str, &'static str, Option<TextColor>) {
    match score {
        0..=4 => ("🔴", "Detractor", Some(TextColor::AlertRed)),
        5..=7 => ("🟠", "Passive", Some(TextColor::WarningAmber)),
        _ => ("🟢", "Promoter", None),
    }
}

pub fn comment_card(info: BatchInfo, comments: &[CommentRecord]) -> Card {
    let mut builder = CardBuilder::new(format!(
        "NPS Comments ({}-{} of {})",
        info.first, info.last, info.total
    ))
    .subtitle("Automated report");

    for c in comments {
        let (emoji, band, color) = score_band(c.score);
        let score = c.score.to_string();
        builder = builder
            .untitled_section()
            .kv("Store", format!("{emoji} {} ({band})", c.store))
            .kv("Timestamp", &c.timestamp)
            .styled_kv(
                "Score",
                match color {
                    Some(color) => StyledText::colored(score, color),
                    None => StyledText::plain(score),
                },
            )
            .paragraph(&c.comment);
    }
    builder.build()
}

pub fn comment_batch_card(info: BatchInfo, comments: &[CommentRecord]) -> Value {
    comment_card(info, comments).to_chat_payload(&card_id(&format!("comments_{}", info.first)))
}

// --- Complaints ---

fn complaint_widgets(builder: CardBuilder, c: &ComplaintRecord) -> CardBuilder {
    let reason = if c.detailed_reason.trim().is_empty() {
        &c.reason
    } else {
        &c.detailed_reason
    };
    let or_dash = |v: &str| {
        if v.trim().is_empty() {
            "—".to_string()
        } else {
            v.to_string()
        }
    };
    builder
        .icon_kv("Date Opened", or_dash(&c.date), "CLOCK")
        .icon_kv("Category", or_dash(&c.category), "DESCRIPTION")
        .icon_kv("Reason", or_dash(reason), "TICKET")
        .headed_paragraph("Description", &c.description)
        .headed_paragraph("Store Response", &c.response)
}

pub fn complaint_card(c: &ComplaintRecord) -> Card {
    let builder = CardBuilder::new(format!("🚨 New Customer Complaint (#{})", c.case_number))
        .subtitle(&c.store)
        .untitled_section();
    complaint_widgets(builder, c).build()
}

pub fn complaint_batch_card(info: BatchInfo, complaints: &[ComplaintRecord]) -> Value {
    let card = match complaints {
        [single] => complaint_card(single),
        _ => complaints.iter().fold(
            CardBuilder::new(format!(
                "🚨 New Customer Complaints ({}-{} of {})",
                info.first, info.last, info.total
            ))
            .subtitle("Automated report"),
            |builder, c| {
                let header = if c.store.is_empty() {
                    format!("#{}", c.case_number)
                } else {
                    format!("#{} · {}", c.case_number, c.store)
                };
                complaint_widgets(builder.section(header), c)
            },
        )
        .build(),
    };
    card.to_chat_payload(&card_id(&format!("complaints_{}", info.first)))
}

// --- Daily report ---

pub fn daily_report_card(report: &DailyReport) -> Card {
    let when = if is_placeholder(&report.page_timestamp) {
        report.run_date.to_string()
    } else {
        report.page_timestamp.clone()
    };
    let subtitle = if is_placeholder(&report.store_line) {
        String::new()
    } else {
        report.store_line.clone()
    };
    let mut builder = CardBuilder::new(format!("Retail Daily Summary — {when}")).subtitle(subtitle);

    for &section in SECTIONS {
        builder = builder.section(section);
        if section == SALES_NPS && !is_placeholder(&report.period_range) {
            builder = builder.kv("Period", &report.period_range);
        }
        for metric in report.metrics.iter().filter(|m| m.section == section) {
            let Some(value) = metric.value() else {
                continue;
            };
            let value = match &metric.target {
                Some(target) => format!("{value} (target {target})"),
                None => value.to_string(),
            };
            let text = match TextColor::for_status(metric.status) {
                Some(color) => StyledText::colored(value, color),
                None => StyledText::plain(value),
            };
            builder = builder.styled_kv(&metric.label, text);
        }
    }
    builder.build()
}

pub fn daily_report_payload(report: &DailyReport) -> Value {
    daily_report_card(report).to_chat_payload(&card_id("daily"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use dashwatch_common::MetricRecord;

    fn metric(name: &str, section: &str, value: &str, status: MetricStatus) -> MetricRecord {
        MetricRecord {
            name: name.into(),
            label: name.to_uppercase(),
            section: section.into(),
            raw_value: Some(value.into()),
            corrected_value: None,
            status,
            target: None,
        }
    }

    fn info(first: usize, last: usize, total: usize) -> BatchInfo {
        BatchInfo {
            index: 0,
            first,
            last,
            total,
        }
    }

    #[test]
    fn escapes_user_text() {
        let card = CardBuilder::new("t")
            .paragraph("<script>a & b</script>\nnext")
            .build();
        let payload = card.to_chat_payload("id");
        assert_eq!(
            payload["cardsV2"][0]["card"]["sections"][0]["widgets"][0]["textParagraph"]["text"],
            "&lt;script&gt;a &amp; b&lt;/script&gt;<br>next"
        );
    }

    #[test]
    fn empty_sections_are_dropped() {
        let card = CardBuilder::new("t")
            .section("Empty")
            .section("Full")
            .kv("a", "1")
            .section("Also empty")
            .build();
        assert_eq!(card.section_headers(), vec!["Full"]);
    }

    #[test]
    fn daily_card_suppresses_missing_values_and_colors_status() {
        let report = DailyReport {
            page_timestamp: "3 Mar 2025, 07:15:00".into(),
            period_range: "—".into(),
            store_line: "—".into(),
            run_date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            metrics: vec![
                metric("sales_total", SALES_NPS, "465K", MetricStatus::Green),
                metric("cafe_nps", SALES_NPS, "No data", MetricStatus::Unknown),
                metric("availability_pct", "Online", "88%", MetricStatus::Red),
                metric("moa", "Shrink", "—", MetricStatus::Unknown),
                metric("efficiency", "Front End Service", "-", MetricStatus::Unknown),
                metric("swipe_rate", "Card Engagement & Misc", "61%", MetricStatus::BelowRange),
            ],
        };

        let card = daily_report_card(&report);
        assert_eq!(card.title(), "Retail Daily Summary — 3 Mar 2025, 07:15:00");
        assert_eq!(
            card.section_headers(),
            vec![SALES_NPS, "Online", "Card Engagement & Misc"]
        );
        assert_eq!(card.widget_count(), 3);

        let payload = card.to_chat_payload("daily").to_string();
        assert!(payload.contains("#d93025\\\">88%"));
        assert!(payload.contains("#f9ab00\\\">61%"));
        assert!(!payload.contains("No data"));
        assert!(payload.contains("\"text\":\"465K\""));
    }

    #[test]
    fn comment_card_labels_scores() {
        let comments = vec![
            CommentRecord {
                store: "123 Leeds".into(),
                timestamp: "2025-03-01".into(),
                score: 3,
                comment: "Queue <long>".into(),
            },
            CommentRecord {
                store: "456 York".into(),
                timestamp: "2025-03-01".into(),
                score: 10,
                comment: "Lovely".into(),
            },
        ];
        let payload = comment_batch_card(info(11, 12, 22), &comments);
        let card = &payload["cardsV2"][0]["card"];
        assert_eq!(card["header"]["title"], "NPS Comments (11-12 of 22)");
        assert_eq!(card["sections"].as_array().unwrap().len(), 2);

        let first = &card["sections"][0]["widgets"];
        assert_eq!(first[0]["decoratedText"]["text"], "🔴 123 Leeds (Detractor)");
        assert_eq!(
            first[2]["decoratedText"]["text"],
            "<font color=\"#d93025\">3</font>"
        );
        assert_eq!(first[3]["textParagraph"]["text"], "Queue &lt;long&gt;");
        assert_eq!(
            card["sections"][1]["widgets"][0]["decoratedText"]["text"],
            "🟢 456 York (Promoter)"
        );
    }

    #[test]
    fn single_complaint_card_uses_case_header() {
        let complaint = ComplaintRecord {
            case_number: "CAS-1".into(),
            date: "01 Mar 2025".into(),
            store: "123 Leeds".into(),
            category: "Product".into(),
            reason: "Quality".into(),
            detailed_reason: "Out of date".into(),
            description: "Milk <off>".into(),
            response: "Refunded".into(),
            ..ComplaintRecord::default()
        };
        let payload = complaint_batch_card(info(1, 1, 1), &[complaint]);
        let card = &payload["cardsV2"][0]["card"];
        assert_eq!(card["header"]["title"], "🚨 New Customer Complaint (#CAS-1)");
        assert_eq!(card["header"]["subtitle"], "123 Leeds");
        let widgets = &card["sections"][0]["widgets"];
        assert_eq!(widgets[2]["decoratedText"]["text"], "Out of date");
        assert_eq!(widgets[0]["decoratedText"]["startIcon"]["knownIcon"], "CLOCK");
        assert_eq!(
            widgets[3]["textParagraph"]["text"],
            "<b>Description:</b><br>Milk &lt;off&gt;"
        );
    }
}
