//! HTML报告生成模块
//! 把解读文本转换为可打印的单页 HTML

use build_html::{Html, HtmlContainer, HtmlPage};
use chrono::{DateTime, Local};

use crate::pipeline::messages;

/// 解读结果的 HTML 生成器
pub struct HtmlReportGenerator;

impl HtmlReportGenerator {
    /// 生成导出用 HTML：标题、正文（保留换行）、免责声明、生成时间
    pub fn generate_interpretation(interpretation: &str, generated_at: DateTime<Local>) -> String {
        let css = format!(
            "{}{}",
            super::styles::get_export_css(),
            super::styles::CssStyleManager::get_screen_css()
        );
        let mut html = HtmlPage::new()
            .with_title("Interpretación de análisis clínico")
            .with_meta(vec![("charset", "utf-8")])
            .with_style(css);

        html.add_raw("<div class=\"sheet\">");
        html.add_raw(&format!(
            "<h1 class=\"export-title\">{}</h1>",
            Self::escape_html(messages::EXPORT_TITLE)
        ));

        html.add_raw("<div class=\"interpretation\">");
        html.add_raw(&Self::paragraphs(interpretation));
        html.add_raw("</div>");

        html.add_raw(&format!(
            "<p class=\"disclaimer\">{}</p>",
            Self::escape_html(messages::DISCLAIMER)
        ));
        html.add_raw(&format!(
            "<div class=\"footer\">{}</div>",
            generated_at.format("%d/%m/%Y %H:%M")
        ));
        html.add_raw("</div>");

        html.to_html_string()
    }

    /// 空行分段，段内换行转为 `<br/>`
    fn paragraphs(text: &str) -> String {
        let normalized = text.replace("\r\n", "\n");
        normalized
            .split("\n\n")
            .map(str::trim)
            .filter(|block| !block.is_empty())
            .map(|block| {
                let lines: Vec<String> = block.lines().map(Self::escape_html).collect();
                format!("<p>{}</p>", lines.join("<br/>"))
            })
            .collect()
    }

    fn escape_html(value: &str) -> String {
        value
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
    }
}
