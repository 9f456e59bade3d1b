//! 面向用户的固定文案（西班牙语）

/// 超出单会话图片上限
pub const QUOTA_EXCEEDED: &str = "Solo puedes interpretar un máximo de 2 imágenes por sesión.";

/// 关键词判定未通过
pub const NOT_CLINICAL: &str = "⚠️ El contenido extraído no parece un análisis clínico válido. Por favor, sube una imagen clara del documento de laboratorio.";

/// 解读服务不可达或返回错误
pub const CONNECTION_ERROR: &str = "Error de conexión con la API.";

/// 引擎无法读取图片（格式不支持或数据损坏）
pub const UNREADABLE_IMAGE: &str = "No se pudo leer la imagen. Sube una foto JPG o PNG del análisis.";

/// 解读服务返回空内容
pub const EMPTY_INTERPRETATION: &str = "Error al interpretar.";

/// 显示和导出时附带的免责声明
pub const DISCLAIMER: &str =
    "* Esta información es educativa y no reemplaza la opinión de un profesional de la salud.";

/// 导出文档标题
pub const EXPORT_TITLE: &str = "🩺 Interpretación médica:";

/// /api/interpreter 的错误文案
pub const MISSING_CONTENT: &str = "Texto faltante para interpretar";
pub const METHOD_NOT_ALLOWED: &str = "Método no permitido";
pub const SERVICE_FAILURE: &str = "Error al procesar con OpenAI";

/// 会话接口的错误文案
pub const UNSUPPORTED_MEDIA: &str = "Solo se permiten archivos de imagen.";
pub const IMAGE_NOT_FOUND: &str = "La imagen solicitada no existe.";
pub const NO_IMAGES: &str = "Sube al menos una imagen antes de interpretar.";
pub const BUSY: &str = "Ya se está procesando el análisis. Espera a que termine.";
pub const NO_RESULT: &str = "No hay una interpretación para descargar.";
pub const EXPORT_FAILED: &str = "No se pudo generar el PDF. La interpretación sigue disponible.";
pub const UPLOAD_FAILED: &str = "No se pudo procesar la imagen.";
pub const SESSION_UNAVAILABLE: &str = "Sesión no disponible.";
