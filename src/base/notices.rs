//! User-visible notice templates.

use super::types::{AccountId, BanReason};

/// Usage hint for the roster commands.
pub const ROSTER_USAGE: &str = "Please provide a valid account id or @ the bot.";

/// Reply when `list_bots` finds an empty roster.
pub const ROSTER_EMPTY: &str = "No bots are currently monitored.";

/// Formats a duration in seconds for humans ("10 minutes", "45 seconds").
pub fn format_duration(secs: u64) -> String {
    match secs {
        s if s >= 60 && s % 60 == 0 => plural(s / 60, "minute"),
        s => plural(s, "second"),
    }
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 { format!("1 {unit}") } else { format!("{n} {unit}s") }
}

/// Notice sent after an offender has been muted.
pub fn ban_notice(offender: AccountId, reason: BanReason, count: usize, detection_window_secs: u64, ban_duration_secs: u64) -> String {
    let finding = match reason {
        BanReason::Loop => format!("Bot loop detected ({count} interactions in {detection_window_secs}s)"),
        BanReason::Spam => format!("Bot spam detected ({count} messages in {detection_window_secs}s)"),
    };

    format!("{finding}, muted {offender} for {}.", format_duration(ban_duration_secs))
}

/// Notice sent when the mute itself failed.
pub fn ban_failed_notice(offender: AccountId) -> String {
    format!("Failed to mute {offender}, please check permissions.")
}

/// Reply after `add_bot`.
pub fn bots_added_notice(added: &[AccountId]) -> String {
    if added.is_empty() {
        "The specified bots are already monitored.".to_string()
    } else {
        format!("Bot(s) {} added to the monitoring list.", join(added))
    }
}

/// Reply after `del_bot`.
pub fn bots_removed_notice(removed: &[AccountId]) -> String {
    if removed.is_empty() {
        "The specified bots were not monitored.".to_string()
    } else {
        format!("Bot(s) {} removed from the monitoring list.", join(removed))
    }
}

/// Reply to `list_bots`.
pub fn bots_listed_notice(bots: &[AccountId]) -> String {
    if bots.is_empty() {
        return ROSTER_EMPTY.to_string();
    }

    let lines = bots.iter().map(|id| id.to_string()).collect::<Vec<_>>().join("\n");
    format!("Monitored bots:\n{lines}")
}

fn join(ids: &[AccountId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(600), "10 minutes");
        assert_eq!(format_duration(60), "1 minute");
        assert_eq!(format_duration(90), "90 seconds");
        assert_eq!(format_duration(1), "1 second");
    }

    #[test]
    fn ban_notice_names_reason_count_and_duration() {
        assert_eq!(ban_notice(7, BanReason::Loop, 2, 30, 600), "Bot loop detected (2 interactions in 30s), muted 7 for 10 minutes.");
        assert_eq!(ban_notice(7, BanReason::Spam, 5, 30, 60), "Bot spam detected (5 messages in 30s), muted 7 for 1 minute.");
    }

    #[test]
    fn roster_notices() {
        assert_eq!(bots_added_notice(&[1, 2]), "Bot(s) 1, 2 added to the monitoring list.");
        assert_eq!(bots_added_notice(&[]), "The specified bots are already monitored.");
        assert_eq!(bots_listed_notice(&[]), ROSTER_EMPTY);
        assert_eq!(bots_listed_notice(&[3, 4]), "Monitored bots:\n3\n4");
    }
}
