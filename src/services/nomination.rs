//! 存档提名服务 - 业务能力层
//!
//! 只负责"把来源 URL 提交到存档提名入口"，与主流程成败无关

use async_trait::async_trait;
use tracing::debug;

use crate::config::{NominationSettings, OperatorIdentity};
use crate::error::NominationError;

/// 提名能力
#[async_trait]
pub trait Nominator: Send + Sync {
    /// 提交一个 URL
    async fn nominate(&self, url: &str, operator: &OperatorIdentity)
        -> Result<(), NominationError>;
}

/// 通过 HTTP 表单提交提名
pub struct HttpNominator {
    client: reqwest::Client,
    settings: NominationSettings,
}

impl HttpNominator {
    pub fn new(settings: NominationSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }
}

#[async_trait]
impl Nominator for HttpNominator {
    async fn nominate(
        &self,
        url: &str,
        operator: &OperatorIdentity,
    ) -> Result<(), NominationError> {
        let form = [
            ("url_value", url),
            ("nominator_name", operator.name.as_deref().unwrap_or("")),
            ("nominator_email", operator.email.as_deref().unwrap_or("")),
            (
                "nominator_institution",
                operator.institution.as_deref().unwrap_or(""),
            ),
            ("project", self.settings.project.as_str()),
        ];
        debug!("Nominating {} at {}", url, self.settings.endpoint);

        let response = self
            .client
            .post(&self.settings.endpoint)
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() || status.is_redirection() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NominationError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            })
        }
    }
}
