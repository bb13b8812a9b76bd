use crate::contracts::{BuildDescriptor, ComparisonResult, RemoteRelease, UnknownReason};

/// Abbreviated hashes match when one is a prefix of the other
fn same_commit(left: &str, right: &str) -> bool {
    let left = left.to_ascii_lowercase();
    let right = right.to_ascii_lowercase();
    left.starts_with(&right) || right.starts_with(&left)
}

/// Decide whether `latest` supersedes `current`.
///
/// Build numbers are ordered numerically on any channel. Commit hashes can only prove
/// equality, so two different hashes yield `Unknown(Unordered)` instead of a guessed update.
/// When neither is decisive and the builds sit on different channels the reason is
/// `ChannelMismatch`.
pub fn compare(current: &BuildDescriptor, latest: &RemoteRelease) -> ComparisonResult {
    let remote = &latest.descriptor;
    let same_channel = current.channel == remote.channel;

    if let (Some(current_build), Some(latest_build)) = (current.build_number, remote.build_number) {
        return if latest_build > current_build {
            ComparisonResult::UpdateAvailable(latest.clone())
        } else {
            ComparisonResult::UpToDate
        };
    }

    if let (Some(current_hash), Some(latest_hash)) = (&current.commit_hash, &remote.commit_hash) {
        return if same_commit(current_hash, latest_hash) {
            ComparisonResult::UpToDate
        } else if same_channel {
            ComparisonResult::Unknown(UnknownReason::Unordered)
        } else {
            ComparisonResult::Unknown(UnknownReason::ChannelMismatch)
        };
    }

    if same_channel {
        ComparisonResult::Unknown(UnknownReason::InsufficientData)
    } else {
        ComparisonResult::Unknown(UnknownReason::ChannelMismatch)
    }
}
