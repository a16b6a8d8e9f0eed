//! Interactive quota confirmation.

use async_trait::async_trait;
use dialoguer::Confirm;
use scanreports_core::QuotaConfirmation;
use tracing::warn;

/// Asks on the terminal before continuing below the critical quota.
///
/// Anything other than an explicit yes, including a failed prompt, declines.
pub struct PromptConfirmation;

#[async_trait]
impl QuotaConfirmation for PromptConfirmation {
    async fn confirm_continue(&self, remaining: u32) -> bool {
        let answer = tokio::task::spawn_blocking(move || {
            Confirm::new()
                .with_prompt(format!(
                    "Only {} API requests remaining. Continue creating reports?",
                    remaining
                ))
                .default(false)
                .interact()
        })
        .await;

        match answer {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!(error = %e, "Quota prompt failed, not continuing");
                false
            }
            Err(e) => {
                warn!(error = %e, "Quota prompt task failed, not continuing");
                false
            }
        }
    }
}
