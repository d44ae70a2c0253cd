use std::sync::atomic::{AtomicBool, Ordering};

use super::models::CoreConfig;
use crate::errors::{CoreError, CoreResult};

/// 运行期可切换的开关
///
/// 启动时被环境变量覆盖的开关会被锁定，之后的修改返回 `Forbidden`。
#[derive(Debug)]
pub struct RuntimeSettings {
    notification_enabled: AtomicBool,
    read_only: AtomicBool,
    notification_locked: bool,
    read_only_locked: bool,
}

impl RuntimeSettings {
    pub fn new(
        config: &CoreConfig,
        notification_locked: bool,
        read_only_locked: bool,
    ) -> Self {
        Self {
            notification_enabled: AtomicBool::new(config.notification_enabled),
            read_only: AtomicBool::new(config.read_only),
            notification_locked,
            read_only_locked,
        }
    }

    pub fn notification_enabled(&self) -> bool {
        self.notification_enabled.load(Ordering::SeqCst)
    }

    pub fn read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    pub fn set_notification_enabled(&self, enabled: bool) -> CoreResult<()> {
        if self.notification_locked {
            return Err(CoreError::Forbidden(
                "notification_enabled 已由环境变量设置".to_string(),
            ));
        }
        self.notification_enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    pub fn set_read_only(&self, read_only: bool) -> CoreResult<()> {
        if self.read_only_locked {
            return Err(CoreError::Forbidden("read_only 已由环境变量设置".to_string()));
        }
        self.read_only.store(read_only, Ordering::SeqCst);
        Ok(())
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::new(&CoreConfig::default(), false, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_unlocked_switch_can_change() {
        let settings = RuntimeSettings::default();
        assert!(settings.notification_enabled());
        settings.set_notification_enabled(false).unwrap();
        assert!(!settings.notification_enabled());
    }

    #[test]
    fn test_locked_switch_is_forbidden() {
        let settings = RuntimeSettings::new(&CoreConfig::default(), false, true);
        let err = settings.set_read_only(true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(!settings.read_only());
    }
}
