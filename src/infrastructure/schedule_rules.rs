use crate::domain::models::WeeklyScheduleRule;
use crate::infrastructure::error::InfraError;
use std::sync::Mutex;

pub trait ScheduleRuleRepository: Send + Sync {
    fn list_for_provider(&self, provider_id: &str) -> Result<Vec<WeeklyScheduleRule>, InfraError>;
    fn replace_for_provider(&self, provider_id: &str, rules: Vec<WeeklyScheduleRule>) -> Result<(), InfraError>;
}

#[derive(Debug, Default)]
pub struct InMemoryScheduleRuleRepository {
    rules: Mutex<Vec<WeeklyScheduleRule>>,
}

impl InMemoryScheduleRuleRepository {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<WeeklyScheduleRule>>, InfraError> {
        self.rules
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("schedule rule lock poisoned: {error}")))
    }
}

impl ScheduleRuleRepository for InMemoryScheduleRuleRepository {
    fn list_for_provider(&self, provider_id: &str) -> Result<Vec<WeeklyScheduleRule>, InfraError> {
        let provider_id = provider_id.trim();
        let mut rules = self
            .lock()?
            .iter()
            .filter(|rule| rule.provider_id == provider_id)
            .cloned()
            .collect::<Vec<_>>();
        rules.sort_by_key(|rule| (rule.day_of_week, rule.start_time));
        Ok(rules)
    }

    fn replace_for_provider(&self, provider_id: &str, rules: Vec<WeeklyScheduleRule>) -> Result<(), InfraError> {
        let provider_id = provider_id.trim();
        for rule in &rules {
            rule.validate().map_err(InfraError::InvalidRecord)?;
            if rule.provider_id != provider_id {
                return Err(InfraError::InvalidRecord(format!(
                    "rule for provider {} cannot be stored under {provider_id}",
                    rule.provider_id
                )));
            }
        }

        let mut stored = self.lock()?;
        stored.retain(|rule| rule.provider_id != provider_id);
        stored.extend(rules);
        Ok(())
    }
}
