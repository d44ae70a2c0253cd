use chrono::TimeDelta;
use jobcore_core::{CoreError, CoreResult};

use super::RetentionRule;
use crate::candidate::Candidate;

pub const ALWAYS: &str = "always";
pub const NOTHING: &str = "nothing";
pub const LATEST_PUSHED_K: &str = "latestPushedK";
pub const LATEST_PULLED_N: &str = "latestPulledN";
pub const N_DAYS_SINCE_LAST_PUSH: &str = "nDaysSinceLastPush";
pub const N_DAYS_SINCE_LAST_PULL: &str = "nDaysSinceLastPull";

const KNOWN: [&str; 6] = [
    ALWAYS,
    NOTHING,
    LATEST_PUSHED_K,
    LATEST_PULLED_N,
    N_DAYS_SINCE_LAST_PUSH,
    N_DAYS_SINCE_LAST_PULL,
];

fn needs_param(template: &str) -> bool {
    template != ALWAYS && template != NOTHING
}

fn counts_days(template: &str) -> bool {
    template == N_DAYS_SINCE_LAST_PUSH || template == N_DAYS_SINCE_LAST_PULL
}

/// 读取与模板同名的整数参数
fn param(rule: &RetentionRule) -> CoreResult<i64> {
    let value = rule.params.get(&rule.template).ok_or_else(|| {
        CoreError::invalid(format!("模板 {} 缺少参数", rule.template))
    })?;
    let n = value.as_i64().ok_or_else(|| {
        CoreError::invalid(format!("模板 {} 的参数必须是整数，实际为 {value}", rule.template))
    })?;
    if n < 0 {
        return Err(CoreError::invalid(format!(
            "模板 {} 的参数不能为负数",
            rule.template
        )));
    }
    Ok(n)
}

fn days(rule: &RetentionRule) -> CoreResult<TimeDelta> {
    let n = param(rule)?;
    TimeDelta::try_days(n).ok_or_else(|| {
        CoreError::invalid(format!("模板 {} 的天数超出范围: {n}", rule.template))
    })
}

/// 距 `now` 指定天数之前的unix秒
fn cutoff(rule: &RetentionRule, now: i64) -> CoreResult<i64> {
    now.checked_sub(days(rule)?.num_seconds())
        .ok_or_else(|| CoreError::invalid(format!("模板 {} 的天数超出范围", rule.template)))
}

pub fn validate_template(rule: &RetentionRule) -> CoreResult<()> {
    if !KNOWN.contains(&rule.template.as_str()) {
        return Err(CoreError::invalid(format!("未知的保留模板: {}", rule.template)));
    }
    if counts_days(&rule.template) {
        days(rule)?;
    } else if needs_param(&rule.template) {
        param(rule)?;
    }
    Ok(())
}

/// 在规则圈定的候选中选出需要保留的部分
///
/// `now` 为unix秒，按天数计算的模板以它为基准。
pub fn evaluate_template(
    rule: &RetentionRule,
    mut selected: Vec<Candidate>,
    now: i64,
) -> CoreResult<Vec<Candidate>> {
    validate_template(rule)?;
    let retained = match rule.template.as_str() {
        ALWAYS => selected,
        NOTHING => Vec::new(),
        LATEST_PUSHED_K => {
            let k = param(rule)? as usize;
            selected.sort_by(|a, b| b.pushed_time.cmp(&a.pushed_time).then(a.digest.cmp(&b.digest)));
            selected.truncate(k);
            selected
        }
        LATEST_PULLED_N => {
            let n = param(rule)? as usize;
            selected.sort_by(|a, b| b.pulled_time.cmp(&a.pulled_time).then(a.digest.cmp(&b.digest)));
            selected.truncate(n);
            selected
        }
        N_DAYS_SINCE_LAST_PUSH => {
            let cutoff = cutoff(rule, now)?;
            selected.retain(|c| c.pushed_time >= cutoff);
            selected
        }
        N_DAYS_SINCE_LAST_PULL => {
            let cutoff = cutoff(rule, now)?;
            selected.retain(|c| c.pulled_time >= cutoff);
            selected
        }
        other => return Err(CoreError::invalid(format!("未知的保留模板: {other}"))),
    };
    Ok(retained)
}
