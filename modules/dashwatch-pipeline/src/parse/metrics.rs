use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use dashwatch_common::{DailyReport, MetricRecord, MetricStatus, PLACEHOLDER};

/// One dashboard widget: where it lives on the card and how to find it in the page text.
#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub key: &'static str,
    pub label: &'static str,
    pub section: &'static str,
    /// Tried in order; the first match wins.
    pub patterns: &'static [&'static str],
    pub group: usize,
}

pub const SALES_NPS: &str = "Sales & NPS";
pub const FRONT_END: &str = "Front End Service";
pub const ONLINE: &str = "Online";
pub const WASTE: &str = "Waste & Markdowns (Total)";
pub const PAYROLL: &str = "Payroll";
pub const SHRINK: &str = "Shrink";
pub const ENGAGEMENT: &str = "Card Engagement & Misc";

/// Card order of the sections.
pub const SECTIONS: &[&str] = &[SALES_NPS, FRONT_END, ONLINE, WASTE, PAYROLL, SHRINK, ENGAGEMENT];

const SALES_TOTAL_ROW: &[&str] = &[
    r"(?i)Total\s*\n\s*([£]?[0-9.,]+[KMB]?)\s*\n\s*([+-]?\d+%?)\s*\n\s*([+-]?[£]?[0-9.,]+[KMB]?)",
    r"(?is)Sales.*?\b([£]?[0-9.,]+[KMB]?)\b.*?\b([+-]?\d+%)\b.*?\b([+-]?[£]?[0-9.,]+[KMB]?)\b",
];

const WASTE_TOTAL_ROW: &[&str] = &[
    r"(?is)Waste\s*&\s*Markdowns.*?Total\s*\n\s*([£]?[0-9.,]+[KMB]?)\s*\n\s*([£]?[0-9.,]+[KMB]?)\s*\n\s*([£]?[0-9.,]+[KMB]?)\s*\n\s*([+-]?[£]?[0-9.,]+[KMB]?)\s*\n\s*([+-]?\d+\.?\d*%)",
];

macro_rules! metric {
    ($key:literal, $label:literal, $section:expr, $pattern:literal) => {
        MetricDef {
            key: $key,
            label: $label,
            section: $section,
            patterns: &[$pattern],
            group: 1,
        }
    };
    ($key:literal, $label:literal, $section:expr, $patterns:expr, $group:literal) => {
        MetricDef {
            key: $key,
            label: $label,
            section: $section,
            patterns: $patterns,
            group: $group,
        }
    };
}

pub const CATALOGUE: &[MetricDef] = &[
    // Sales & NPS
    metric!("sales_total", "Sales Total", SALES_NPS, SALES_TOTAL_ROW, 1),
    metric!("sales_lfl", "LFL", SALES_NPS, SALES_TOTAL_ROW, 2),
    metric!("sales_vs_target", "vs Target", SALES_NPS, SALES_TOTAL_ROW, 3),
    metric!("supermarket_nps", "Supermarket NPS", SALES_NPS, r"(?i)\bSupermarket NPS\b\s*(-?\d+)\b"),
    metric!("colleague_happiness", "Colleague Happiness", SALES_NPS, r"(?i)\bColleague Happiness\b\s*(-?\d+)\b"),
    metric!("home_delivery_nps", "Home Delivery NPS", SALES_NPS, r"(?i)\bHome Delivery NPS\b\s*(-?\d+)\b"),
    metric!("cafe_nps", "Cafe NPS", SALES_NPS, r"(?i)\bCafe NPS\b\s*(-?\d+)\b"),
    metric!("click_collect_nps", "Click & Collect NPS", SALES_NPS, r"(?i)\bClick\s*&\s*Collect NPS\b\s*(-?\d+)\b"),
    metric!("customer_toilet_nps", "Customer Toilet NPS", SALES_NPS, r"(?i)\bCustomer Toilet NPS\b\s*(-?\d+)\b"),
    // Front End Service
    metric!("sco_utilisation", "SCO Utilisation", FRONT_END, r"(?i)\bSco Utilisation\b\s*([0-9]+%)"),
    metric!("efficiency", "Efficiency", FRONT_END, r"(?i)\bEfficiency\b\s*([0-9]+%)"),
    metric!("scan_rate", "Scan Rate", FRONT_END, r"(?i)\bScan Rate\b\s*([0-9]+)"),
    metric!("scan_vs_target", "Scan Rate vs Target", FRONT_END, r"(?i)Scan Rate\s*[0-9]+\s*\n\s*vs Target\s*([+-]?[0-9.]+)"),
    metric!("interventions", "Interventions", FRONT_END, r"(?i)\bInterventions\b\s*([0-9]+)"),
    metric!("interventions_vs_target", "Interventions vs Target", FRONT_END, r"(?i)Interventions\s*[0-9]+\s*\n\s*vs Target\s*([+-]?[0-9.]+)"),
    metric!("mainbank_closed", "Mainbank Closed", FRONT_END, r"(?i)\bMainbank Closed\b\s*([0-9]+)"),
    metric!("mainbank_vs_target", "Mainbank vs Target", FRONT_END, r"(?i)Mainbank Closed\s*[0-9]+\s*\n\s*vs Target\s*([+-]?[0-9.]+)"),
    // Online
    metric!("availability_pct", "Availability", ONLINE, r"(?i)\bAvailability\b\s*([0-9]+%)"),
    metric!("despatched_on_time", "Despatched on Time", ONLINE, r"(?i)\bDespatched on Time\b\s*([0-9]+%|No data)"),
    metric!("delivered_on_time", "Delivered on Time", ONLINE, r"(?i)\bDelivered on Time\b\s*([0-9]+%|No data)"),
    metric!("cc_avg_wait", "Click & Collect Avg Wait", ONLINE, r"(?i)\bClick\s*&\s*Collect average wait\b\s*([0-9]{2}:[0-9]{2})"),
    // Waste & Markdowns
    metric!("waste_total", "Waste", WASTE, WASTE_TOTAL_ROW, 1),
    metric!("markdowns_total", "Markdowns", WASTE, WASTE_TOTAL_ROW, 2),
    metric!("wm_total", "Total", WASTE, WASTE_TOTAL_ROW, 3),
    metric!("wm_delta", "+/−", WASTE, WASTE_TOTAL_ROW, 4),
    metric!("wm_delta_pct", "+/− %", WASTE, WASTE_TOTAL_ROW, 5),
    // Payroll
    metric!("payroll_outturn", "Payroll Outturn", PAYROLL, r"(?i)\bPayroll Outturn\b\s*([+-]?[£]?[0-9.,]+[KMB]?)"),
    metric!("absence_outturn", "Absence Outturn", PAYROLL, r"(?i)\bAbsence Outturn\b\s*([+-]?[£]?[0-9.,]+[KMB]?)"),
    metric!("productive_outturn", "Productive Outturn", PAYROLL, r"(?i)\bProductive Outturn\b\s*([+-]?[£]?[0-9.,]+[KMB]?)"),
    metric!("holiday_outturn", "Holiday Outturn", PAYROLL, r"(?i)\bHoliday Outturn\b\s*([+-]?[£]?[0-9.,]+[KMB]?)"),
    metric!("current_base_cost", "Current Base Cost", PAYROLL, r"(?i)\bCurrent Base Cost\b\s*([£]?[0-9.,]+[KMB]?)"),
    // Shrink
    metric!("moa", "Morrisons Order Adjustments", SHRINK, r"(?i)\bMorrisons Order Adjustments\b\s*([£]?-?[0-9.,]+[KMB]?)"),
    metric!("waste_validation", "Waste Validation", SHRINK, r"(?i)\bWaste Validation\b\s*([0-9]+%)"),
    metric!("unrecorded_waste_pct", "Unrecorded Waste %", SHRINK, r"(?i)\bUnrecorded Waste %\s*([+-]?\d+\.?\d*%)"),
    metric!("shrink_vs_budget_pct", "Shrink vs Budget %", SHRINK, r"(?i)\bShrink vs Budget %\s*([+-]?\d+\.?\d*%)"),
    // Card engagement, production planning and misc
    metric!("swipe_rate", "Swipe Rate", ENGAGEMENT, r"(?i)\bSwipe Rate\b\s*([0-9]+%)"),
    metric!("swipes_wow_pct", "Swipes WOW %", ENGAGEMENT, r"(?i)\bSwipes WOW %\s*([+-]?\d+%)"),
    metric!("new_customers", "New Customers", ENGAGEMENT, r"(?i)\bNew Customers\b\s*([0-9]+)"),
    metric!("swipes_yoy_pct", "Swipes YOY %", ENGAGEMENT, r"(?i)\bSwipes YOY %\s*([+-]?\d+%)"),
    metric!("complaints_key", "Key Complaints", ENGAGEMENT, r"(?i)\bKey Customer Complaints\b\s*([0-9]+)"),
    metric!("data_provided", "Data Provided", ENGAGEMENT, r"(?i)\bData Provided\b\s*([0-9]+%)"),
    metric!("trusted_data", "Trusted Data", ENGAGEMENT, r"(?i)\bTrusted Data\b\s*([0-9]+%)"),
    metric!("my_reports", "My Reports", ENGAGEMENT, r"(?i)\bMy Reports\b\s*([0-9]+)"),
    metric!("weekly_activity", "Weekly Activity %", ENGAGEMENT, r"(?i)\bWeekly Activity %\s*([0-9]+%|No data)"),
];

pub fn metric_def(key: &str) -> Option<&'static MetricDef> {
    CATALOGUE.iter().find(|d| d.key == key)
}

struct Compiled {
    def: &'static MetricDef,
    patterns: Vec<Regex>,
}

static COMPILED: LazyLock<Vec<Compiled>> = LazyLock::new(|| {
    CATALOGUE
        .iter()
        .map(|def| Compiled {
            def,
            patterns: def
                .patterns
                .iter()
                .map(|p| Regex::new(p).expect("valid metric regex"))
                .collect(),
        })
        .collect()
});

static PERIOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"The data on this report is from:\s*([^\n]+)").expect("valid regex")
});

static PAGE_TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2}\s+[A-Za-z]{3}\s+\d{4},\s*\d{2}:\d{2}:\d{2})\b").expect("valid regex")
});

static STORE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}).*?(\|\s*.+?\s*\|\s*\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2})",
    )
    .expect("valid regex")
});

fn first_capture(patterns: &[Regex], text: &str, group: usize) -> Option<String> {
    patterns.iter().find_map(|re| {
        let caps = re.captures(text)?;
        caps.get(group)
            .or_else(|| caps.get(0))
            .map(|m| m.as_str().trim().to_string())
    })
}

/// Run every catalogued pattern over the joined page text.
pub fn parse_metrics(text: &str) -> Vec<MetricRecord> {
    COMPILED
        .iter()
        .map(|c| MetricRecord {
            name: c.def.key.to_string(),
            label: c.def.label.to_string(),
            section: c.def.section.to_string(),
            raw_value: Some(
                first_capture(&c.patterns, text, c.def.group)
                    .unwrap_or_else(|| PLACEHOLDER.to_string()),
            ),
            corrected_value: None,
            status: MetricStatus::Unknown,
            target: None,
        })
        .collect()
}

/// Parse the daily dashboard: header context plus every metric.
pub fn parse_daily_report(lines: &[String], run_date: NaiveDate) -> DailyReport {
    let text = lines.join("\n");
    let header = |re: &Regex, group: usize| {
        re.captures(&text)
            .and_then(|c| c.get(group))
            .map(|m| m.as_str().trim().replace('\n', "  "))
            .unwrap_or_else(|| PLACEHOLDER.to_string())
    };

    let report = DailyReport {
        period_range: header(&PERIOD_RE, 1),
        page_timestamp: header(&PAGE_TIMESTAMP_RE, 1),
        store_line: header(&STORE_LINE_RE, 0),
        run_date,
        metrics: parse_metrics(&text),
    };

    let found = report.metrics.iter().filter(|m| !m.is_missing()).count();
    tracing::info!(
        found,
        total = report.metrics.len(),
        page_timestamp = %report.page_timestamp,
        "Parsed daily metrics"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
The data on this report is from: 1 Mar 2025 - 2 Mar 2025
3 Mar 2025, 07:15:00
Sales
Total
465.1K
5%
-2.7K
Supermarket NPS
52
Cafe NPS
No data
Sco Utilisation 81%
Scan Rate 23
vs Target +1.5
Availability 97%
Delivered on Time No data
Waste & Markdowns
Total
2.9K
3K
5.9K
-1.2K
-25.69%
Payroll Outturn -1.4K
Weekly Activity % 88%";

    fn lines() -> Vec<String> {
        SAMPLE.lines().map(String::from).collect()
    }

    fn value<'a>(report: &'a DailyReport, key: &str) -> Option<&'a str> {
        report.metric(key).and_then(|m| m.raw_value.as_deref())
    }

    #[test]
    fn catalogue_keys_are_unique_and_sections_known() {
        let mut keys: Vec<_> = CATALOGUE.iter().map(|d| d.key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), CATALOGUE.len());
        assert!(CATALOGUE.iter().all(|d| SECTIONS.contains(&d.section)));
        assert_eq!(COMPILED.len(), CATALOGUE.len());
    }

    #[test]
    fn parses_header_and_rows() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let report = parse_daily_report(&lines(), date);
        assert_eq!(report.period_range, "1 Mar 2025 - 2 Mar 2025");
        assert_eq!(report.page_timestamp, "3 Mar 2025, 07:15:00");

        assert_eq!(value(&report, "sales_total"), Some("465.1K"));
        assert_eq!(value(&report, "sales_lfl"), Some("5%"));
        assert_eq!(value(&report, "sales_vs_target"), Some("-2.7K"));
        assert_eq!(value(&report, "supermarket_nps"), Some("52"));
        assert_eq!(value(&report, "sco_utilisation"), Some("81%"));
        assert_eq!(value(&report, "scan_rate"), Some("23"));
        assert_eq!(value(&report, "scan_vs_target"), Some("+1.5"));
        assert_eq!(value(&report, "delivered_on_time"), Some("No data"));
        assert_eq!(value(&report, "wm_delta_pct"), Some("-25.69%"));
        assert_eq!(value(&report, "payroll_outturn"), Some("-1.4K"));
        assert_eq!(value(&report, "weekly_activity"), Some("88%"));
    }

    #[test]
    fn missing_metrics_get_placeholder() {
        let report = parse_daily_report(&lines(), NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
        assert_eq!(value(&report, "moa"), Some(PLACEHOLDER));
        assert!(report.metric("moa").unwrap().is_missing());
        assert_eq!(report.store_line, PLACEHOLDER);
    }
}
