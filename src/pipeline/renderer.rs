use serde::Serialize;

use super::messages;

/// 一次运行的可显示结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum RenderedOutcome {
    /// 解读服务给出的说明，唯一可导出的结果
    Interpretation(String),
    /// 内容不像化验单
    Advisory(String),
    /// OCR 或解读服务失败
    Failure(String),
}

impl RenderedOutcome {
    pub fn text(&self) -> &str {
        match self {
            Self::Interpretation(text) | Self::Advisory(text) | Self::Failure(text) => text,
        }
    }

    pub fn is_interpretation(&self) -> bool {
        matches!(self, Self::Interpretation(_))
    }

    /// 显示时附带免责声明的只有解读结果
    pub fn disclaimer(&self) -> Option<&'static str> {
        self.is_interpretation().then_some(messages::DISCLAIMER)
    }
}

/// 持有最近一次结果（至多一个）
#[derive(Debug, Default)]
pub struct ResultRenderer {
    current: Option<RenderedOutcome>,
}

impl ResultRenderer {
    pub fn show(&mut self, outcome: RenderedOutcome) {
        self.current = Some(outcome);
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&RenderedOutcome> {
        self.current.as_ref()
    }

    /// 仅当持有解读结果时返回文本
    pub fn interpretation(&self) -> Option<&str> {
        match &self.current {
            Some(RenderedOutcome::Interpretation(text)) => Some(text),
            _ => None,
        }
    }

    pub fn has_result(&self) -> bool {
        self.interpretation().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_interpretation_counts_as_result() {
        let mut renderer = ResultRenderer::default();
        renderer.show(RenderedOutcome::Advisory(messages::NOT_CLINICAL.to_string()));
        assert!(!renderer.has_result());
        assert_eq!(renderer.current().map(RenderedOutcome::text), Some(messages::NOT_CLINICAL));

        renderer.show(RenderedOutcome::Interpretation("Glucosa normal".to_string()));
        assert!(renderer.has_result());
        assert_eq!(renderer.interpretation(), Some("Glucosa normal"));

        renderer.clear();
        assert!(renderer.current().is_none());
    }

    #[test]
    fn outcome_serializes_with_kind_tag() {
        let json = serde_json::to_value(RenderedOutcome::Failure("x".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "failure", "text": "x"}));
    }
}
