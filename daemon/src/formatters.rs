use chrono::{Local, TimeZone};

use crate::types::{
    CursorUsageData, MiniMaxRemainsData, ModelRemain, PackyCodexUsage, UsdAmount,
    YesCodeBalanceData,
};

/// Token counts arrive as decimal strings
pub fn format_tokens(tokens: Option<&str>) -> String {
    let Some(num) = tokens.and_then(|t| t.trim().parse::<i64>().ok()) else {
        return "0".to_string();
    };
    if num >= 1_000_000 {
        format!("{:.2}M", num as f64 / 1_000_000.0)
    } else if num >= 1_000 {
        format!("{:.1}K", num as f64 / 1_000.0)
    } else {
        num.to_string()
    }
}

/// Cents to dollars
pub fn format_cost(cents: Option<f64>) -> String {
    match cents {
        Some(cents) if cents != 0.0 => format!("${:.2}", cents / 100.0),
        _ => "$0.00".to_string(),
    }
}

/// Human countdown until a MiniMax interval resets
pub fn format_reset_countdown(ms: i64) -> String {
    if ms <= 0 {
        return "即将重置".to_string();
    }
    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}天{}小时后重置", days, hours % 24)
    } else if hours > 0 {
        format!("{}小时{}分钟后重置", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}分钟{}秒后重置", minutes, seconds % 60)
    } else {
        format!("{}秒后重置", seconds)
    }
}

/// Spent/budget pair ready for display
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetProgress {
    /// Clamped to 0..=100; zero when the budget is unusable
    pub percent: f64,
    pub spent: String,
    pub budget: String,
    pub percent_label: String,
}

pub fn budget_progress(spent: Option<&UsdAmount>, budget: Option<&UsdAmount>) -> BudgetProgress {
    let spent = spent
        .and_then(UsdAmount::as_f64)
        .filter(|v| v.is_finite())
        .unwrap_or(0.0);
    let budget = budget.and_then(UsdAmount::as_f64).filter(|v| *v > 0.0);

    match budget {
        Some(budget) => {
            let percent = (spent / budget * 100.0).clamp(0.0, 100.0);
            BudgetProgress {
                percent,
                spent: format!("{:.2}", spent),
                budget: format!("{:.2}", budget),
                percent_label: format!("{:.1}%", percent),
            }
        }
        None => BudgetProgress {
            percent: 0.0,
            spent: format!("{:.2}", spent),
            budget: "N/A".to_string(),
            percent_label: "N/A".to_string(),
        },
    }
}

/// Share of the MiniMax interval already consumed. The upstream
/// `current_interval_usage_count` is the number of calls still available.
pub fn minimax_used_percent(model: &ModelRemain) -> f64 {
    let total = model.current_interval_total_count;
    if total <= 0 {
        return 0.0;
    }
    let remaining = model.current_interval_usage_count;
    total.saturating_sub(remaining) as f64 / total as f64 * 100.0
}

fn clock_time(epoch_ms: i64) -> String {
    Local
        .timestamp_millis_opt(epoch_ms)
        .single()
        .map(|time| time.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}

/// Plain-text usage cards for the CLI, with optional ANSI colors
pub struct TerminalFormatter {
    pub use_colors: bool,
}

impl TerminalFormatter {
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            match color {
                "red" => format!("\x1b[31m{}\x1b[0m", text),
                "orange" => format!("\x1b[33m{}\x1b[0m", text),
                "green" => format!("\x1b[32m{}\x1b[0m", text),
                "gray" => format!("\x1b[90m{}\x1b[0m", text),
                "bold" => format!("\x1b[1m{}\x1b[0m", text),
                _ => text.to_string(),
            }
        } else {
            text.to_string()
        }
    }

    fn header(&self, title: &str) -> String {
        format!(
            "{}\n{}\n",
            self.colorize(title, "bold"),
            self.colorize(&"═".repeat(20), "gray")
        )
    }

    fn percent_color(percent: f64) -> &'static str {
        if percent >= 90.0 {
            "red"
        } else if percent >= 70.0 {
            "orange"
        } else {
            "green"
        }
    }

    pub fn format_yescode(&self, data: &YesCodeBalanceData) -> String {
        let mut output = self.header("YesCode 余额统计");
        output.push_str(&format!(
            "订阅余额: ${:.2}\n",
            data.subscription_balance.unwrap_or(0.0)
        ));

        let spent = data.weekly_spent_balance.unwrap_or(0.0);
        match data.weekly_limit.filter(|limit| *limit > 0.0) {
            Some(limit) => {
                let percent = spent / limit * 100.0;
                output.push_str(&format!(
                    "本周使用情况: {}\n",
                    self.colorize(&format!("{:.1}%", percent), Self::percent_color(percent))
                ));
                output.push_str(&format!("已使用: ${:.2}  限额: ${:.2}\n", spent, limit));
            }
            None => {
                output.push_str("本周使用情况: N/A\n");
                output.push_str(&format!("已使用: ${:.2}  限额: N/A\n", spent));
            }
        }
        output
    }

    pub fn format_cursor(&self, data: &CursorUsageData) -> String {
        let mut output = self.header("Cursor 每月用量");
        output.push_str(&format!(
            "费用: {}\n",
            self.colorize(&format_cost(data.total_cost_cents), "bold")
        ));
        output.push_str(&format!(
            "输入: {}  输出: {}\n",
            format_tokens(data.total_input_tokens.as_deref()),
            format_tokens(data.total_output_tokens.as_deref())
        ));
        output.push_str(&format!(
            "缓存写入: {}  缓存读取: {}\n",
            format_tokens(data.total_cache_write_tokens.as_deref()),
            format_tokens(data.total_cache_read_tokens.as_deref())
        ));

        for aggregation in &data.aggregations {
            output.push_str(&self.colorize(
                &format!(
                    "  {}: {} ({} / {})\n",
                    aggregation.model_intent.as_deref().unwrap_or("unknown"),
                    format_cost(aggregation.total_cents),
                    format_tokens(aggregation.input_tokens.as_deref()),
                    format_tokens(aggregation.output_tokens.as_deref())
                ),
                "gray",
            ));
        }
        output
    }

    pub fn format_minimax(&self, data: &MiniMaxRemainsData) -> String {
        let mut output = self.header("MiniMax 用量");
        let models = &data.model_remains;
        if models.is_empty() {
            output.push_str(&self.colorize("暂无数据\n", "gray"));
            return output;
        }

        for model in models {
            let percent = minimax_used_percent(model);
            output.push_str(&format!(
                "{}  {} - {}\n",
                self.colorize(model.model_name.as_deref().unwrap_or("MiniMax"), "bold"),
                clock_time(model.start_time),
                clock_time(model.end_time)
            ));
            output.push_str(&format!(
                "  {}  已使用 {}\n",
                self.colorize(&format_reset_countdown(model.remains_time), "gray"),
                self.colorize(&format!("{:.1}%", percent), Self::percent_color(percent))
            ));
        }
        output
    }

    pub fn format_packycodex(&self, usage: &PackyCodexUsage) -> String {
        let mut output = self.header("PackyCodex 用量");
        let rows = [
            (
                "每日用量",
                budget_progress(usage.daily_spent_usd.as_ref(), usage.daily_budget_usd.as_ref()),
            ),
            (
                "每周用量",
                budget_progress(
                    usage.weekly_spent_usd.as_ref(),
                    usage.weekly_budget_usd.as_ref(),
                ),
            ),
        ];

        for (label, progress) in rows {
            output.push_str(&format!(
                "{}: {}\n",
                label,
                self.colorize(&progress.percent_label, Self::percent_color(progress.percent))
            ));
            output.push_str(&format!(
                "  已使用: ${}  限额: ${}\n",
                progress.spent, progress.budget
            ));
        }

        if let Some(end) = &usage.weekly_window_end {
            output.push_str(&self.colorize(&format!("每周重置时间: {}\n", end), "gray"));
        }
        output
    }

    pub fn format_error(&self, message: &str) -> String {
        self.colorize(message, "red")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CursorUsageAggregation, PackyCodexUsage};

    #[test]
    fn test_token_formatting() {
        assert_eq!(format_tokens(None), "0");
        assert_eq!(format_tokens(Some("")), "0");
        assert_eq!(format_tokens(Some("999")), "999");
        assert_eq!(format_tokens(Some("1200")), "1.2K");
        assert_eq!(format_tokens(Some("4500000")), "4.50M");
    }

    #[test]
    fn test_cost_formatting() {
        assert_eq!(format_cost(None), "$0.00");
        assert_eq!(format_cost(Some(0.0)), "$0.00");
        assert_eq!(format_cost(Some(1234.0)), "$12.34");
    }

    #[test]
    fn test_reset_countdown() {
        assert_eq!(format_reset_countdown(0), "即将重置");
        assert_eq!(format_reset_countdown(-5), "即将重置");
        assert_eq!(format_reset_countdown(42_000), "42秒后重置");
        assert_eq!(format_reset_countdown(125_000), "2分钟5秒后重置");
        assert_eq!(format_reset_countdown(2 * 3_600_000 + 15 * 60_000), "2小时15分钟后重置");
        assert_eq!(format_reset_countdown(26 * 3_600_000), "1天2小时后重置");
    }

    #[test]
    fn test_budget_progress_clamps_and_handles_missing_budget() {
        let over = budget_progress(
            Some(&UsdAmount::Text("15".to_string())),
            Some(&UsdAmount::Text("10".to_string())),
        );
        assert_eq!(over.percent, 100.0);
        assert_eq!(over.percent_label, "100.0%");

        let half = budget_progress(Some(&UsdAmount::Number(2.5)), Some(&UsdAmount::Number(10.0)));
        assert_eq!(half.percent_label, "25.0%");
        assert_eq!(half.spent, "2.50");
        assert_eq!(half.budget, "10.00");

        let unusable = budget_progress(
            Some(&UsdAmount::Text("abc".to_string())),
            Some(&UsdAmount::Text("0".to_string())),
        );
        assert_eq!(unusable.spent, "0.00");
        assert_eq!(unusable.budget, "N/A");
        assert_eq!(unusable.percent_label, "N/A");
    }

    #[test]
    fn test_minimax_percent_uses_remaining_count() {
        let model = ModelRemain {
            model_name: Some("MiniMax-M2".to_string()),
            current_interval_total_count: 200,
            current_interval_usage_count: 150,
            ..Default::default()
        };
        assert_eq!(minimax_used_percent(&model), 25.0);

        let empty = ModelRemain {
            current_interval_total_count: 0,
            ..model.clone()
        };
        assert_eq!(minimax_used_percent(&empty), 0.0);

        let hostile = ModelRemain {
            current_interval_total_count: i64::MAX,
            current_interval_usage_count: i64::MIN,
            ..model
        };
        assert_eq!(minimax_used_percent(&hostile), 100.0);
    }

    #[test]
    fn test_plain_output_has_no_escape_codes() {
        let formatter = TerminalFormatter::new(false);
        let cursor = CursorUsageData {
            aggregations: vec![CursorUsageAggregation {
                model_intent: Some("claude-4-sonnet".to_string()),
                input_tokens: Some("1200".to_string()),
                output_tokens: Some("300".to_string()),
                cache_write_tokens: None,
                cache_read_tokens: None,
                total_cents: Some(150.0),
            }],
            total_input_tokens: Some("1200".to_string()),
            total_output_tokens: Some("300".to_string()),
            total_cache_write_tokens: None,
            total_cache_read_tokens: None,
            total_cost_cents: Some(150.0),
        };
        let output = formatter.format_cursor(&cursor);
        assert!(!output.contains('\x1b'));
        assert!(output.contains("费用: $1.50"));
        assert!(output.contains("claude-4-sonnet: $1.50 (1.2K / 300)"));

        let yescode = YesCodeBalanceData {
            balance: None,
            pay_as_you_go_balance: None,
            subscription_balance: Some(8.0),
            total_balance: None,
            weekly_limit: Some(0.0),
            weekly_spent_balance: Some(1.0),
        };
        let output = formatter.format_yescode(&yescode);
        assert!(output.contains("订阅余额: $8.00"));
        assert!(output.contains("限额: N/A"));
    }

    #[test]
    fn test_colored_output_wraps_percentages() {
        let formatter = TerminalFormatter::new(true);
        let usage = PackyCodexUsage {
            daily_budget_usd: Some(UsdAmount::Text("10".to_string())),
            daily_spent_usd: Some(UsdAmount::Text("9.5".to_string())),
            weekly_budget_usd: None,
            weekly_spent_usd: None,
            weekly_window_start: None,
            weekly_window_end: Some("2026-10-26T00:00:00Z".to_string()),
        };
        let output = formatter.format_packycodex(&usage);
        assert!(output.contains("\x1b[31m95.0%\x1b[0m"));
        assert!(output.contains("每周重置时间: 2026-10-26T00:00:00Z"));
        assert_eq!(formatter.format_error("boom"), "\x1b[31mboom\x1b[0m");
    }
}
