//! CSS样式管理模块
//! 导出文档固定为单页 A4：版心高度固定，超出部分裁掉，不会分页

/// wkhtmltopdf 页边距（上下左右相同）
pub const PAGE_MARGIN_MM: u32 = 15;

/// CSS样式管理器
pub struct CssStyleManager;

impl CssStyleManager {
    /// 解读导出文档样式
    pub fn get_export_css() -> &'static str {
        r#"
        @page { size: A4; margin: 0; }
        html, body {
            margin: 0;
            padding: 0;
        }
        body {
            font-family: 'DejaVu Sans', 'Noto Sans', Arial, sans-serif;
            font-size: 12pt;
            line-height: 1.5;
            color: #1f2933;
            background-color: #fff;
        }
        .sheet {
            box-sizing: border-box;
            height: 265mm;
            overflow: hidden;
            padding: 8mm 6mm;
            page-break-inside: avoid;
            page-break-after: avoid;
        }
        .export-title {
            color: #0f766e;
            font-size: 1.6em;
            font-weight: bold;
            border-bottom: 2px solid #14b8a6;
            padding-bottom: 6px;
            margin: 0 0 18px 0;
        }
        .interpretation {
            max-height: 205mm;
            overflow: hidden;
            white-space: normal;
            word-wrap: break-word;
            text-align: justify;
        }
        .interpretation p {
            margin: 0 0 8px 0;
        }
        .disclaimer {
            margin-top: 20px;
            font-size: 0.85em;
            font-style: italic;
            color: #52606d;
        }
        .footer {
            margin-top: 16px;
            font-size: 0.75em;
            color: #9aa5b1;
            text-align: right;
        }
        "#
    }

    /// 屏幕查看时的补充样式（HTML 预览用）
    pub fn get_screen_css() -> &'static str {
        r#"
        @media screen {
            body { background-color: #f0f4f8; }
            .sheet {
                max-width: 210mm;
                height: auto;
                margin: 20px auto;
                background: #fff;
                box-shadow: 0 2px 8px rgba(0,0,0,0.1);
            }
        }
        "#
    }
}

pub fn get_export_css() -> &'static str {
    CssStyleManager::get_export_css()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_is_clipped_to_one_page() {
        let css = get_export_css();
        assert!(css.contains("size: A4"));
        assert!(css.contains("height: 265mm"));
        assert!(css.contains("overflow: hidden"));
        // 版心 + 上下页边距不超过 A4 高度
        assert!(265 + 2 * PAGE_MARGIN_MM <= 297);
    }
}
