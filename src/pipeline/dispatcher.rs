use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use super::completion::{CompletionError, CompletionService};
use crate::util::logging::standards::events;

#[derive(Debug, Error)]
pub enum InterpretError {
    #[error("待解读文本为空")]
    EmptyInput,
    #[error("解读服务失败: {0}")]
    Service(#[from] CompletionError),
}

/// 把识别文本交给补全服务，单次调用，不重试
#[derive(Clone)]
pub struct InterpretationDispatcher {
    service: Arc<dyn CompletionService>,
    timeout: Duration,
}

impl InterpretationDispatcher {
    pub fn new(service: Arc<dyn CompletionService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    pub async fn interpret(&self, content: &str) -> Result<String, InterpretError> {
        if content.trim().is_empty() {
            return Err(InterpretError::EmptyInput);
        }

        let prompt = build_prompt(content);
        info!(
            target: "pipeline.dispatch",
            event = events::DISPATCH_START,
            chars = content.chars().count()
        );
        let started = Instant::now();

        let reply = match tokio::time::timeout(self.timeout, self.service.complete(&prompt)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(target: "pipeline.dispatch", event = events::DISPATCH_ERROR, error = %e);
                return Err(e.into());
            }
            Err(_) => {
                warn!(
                    target: "pipeline.dispatch",
                    event = events::DISPATCH_ERROR,
                    timeout_secs = self.timeout.as_secs()
                );
                return Err(CompletionError::Timeout(self.timeout.as_secs()).into());
            }
        };

        info!(
            target: "pipeline.dispatch",
            event = events::DISPATCH_COMPLETE,
            chars = reply.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64
        );
        Ok(reply)
    }
}

/// 固定指令 + 原文
pub fn build_prompt(content: &str) -> String {
    format!(
        r#"
Actúa como un asistente médico virtual.

1. Primero, detecta si el texto extraído parece un análisis clínico.
   Busca valores como hemoglobina, glucosa, colesterol, leucocitos, urea, etc.

2. Si NO parece un análisis clínico, responde:
"El texto no parece un análisis clínico válido. Intenta subir una imagen más clara del estudio."

3. Si SÍ es un análisis clínico:
- Explica cada valor con frases simples y breves.
- Menciona si está en rango, alto o bajo.
- No uses tecnicismos.
- No hagas diagnósticos ni alarmes.
- Sé empático y educativo.
- De ser posible da sugerencias generales de salud hasta el final del texto.

Usa un lenguaje claro y directo para personas sin conocimientos médicos.

Texto:
"""
{content}
"""
"#
    )
}
