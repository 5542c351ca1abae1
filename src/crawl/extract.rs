//! Title and author extraction from a rendered Google Scholar result page.

use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;

use crate::models::Author;
use crate::sources::SourceError;

/// Default base for relative profile links
pub const SCHOLAR_URL: &str = "https://scholar.google.com";

/// Truncation glyph used in author previews
pub(crate) const ELLIPSIS: char = '…';

/// Profile links look like `/citations?user=<12 chars>&hl=en`
const AUTHOR_ID_SPAN: std::ops::Range<usize> = 16..28;

/// The title and full author list of a work
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedArticle {
    pub title: String,
    pub authors: Vec<Author>,
}

impl ExtractedArticle {
    pub fn author_names(&self) -> Vec<&str> {
        self.authors.iter().map(|a| a.name.as_str()).collect()
    }
}

/// Extracts titles and author lists from result pages
#[derive(Debug, Clone)]
pub struct ArticleExtractor {
    base_url: String,
}

impl Default for ArticleExtractor {
    fn default() -> Self {
        Self::new(SCHOLAR_URL)
    }
}

impl ArticleExtractor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Extract the first result's title and authors.
    ///
    /// The author line normally sits in `div.gs_fmaa`. A page answering with a
    /// single reference only has the `div.gs_a` summary line instead, whose
    /// venue clause after `"- "` is dropped.
    pub fn extract(&self, page: &[u8]) -> Result<ExtractedArticle, SourceError> {
        let content = String::from_utf8_lossy(page);
        let document = Html::parse_document(&content);

        let result_selector = selector("div.gs_ri")?;
        let title_selector = selector("h3.gs_rt")?;
        let full_authors_selector = selector("div.gs_fmaa")?;
        let summary_selector = selector("div.gs_a")?;
        let link_selector = selector("a")?;

        let result = document
            .select(&result_selector)
            .next()
            .ok_or_else(|| SourceError::Parse("no result block (div.gs_ri) in page".to_string()))?;

        let title = result
            .select(&title_selector)
            .next()
            .map(element_text)
            .ok_or_else(|| SourceError::Parse("no title (h3.gs_rt) in result block".to_string()))?;

        let (author_block, author_line) = match result.select(&full_authors_selector).next() {
            Some(block) => (block, element_text(block)),
            None => {
                let block = result.select(&summary_selector).next().ok_or_else(|| {
                    SourceError::Parse(format!("no author line for `{}`", title.trim()))
                })?;
                let line = element_text(block);
                let names = line.split("- ").next().unwrap_or_default().to_string();
                (block, names)
            }
        };

        let links: HashMap<String, String> = author_block
            .select(&link_selector)
            .filter_map(|a| {
                let href = a.value().attr("href")?;
                Some((clean_name(&element_text(a)), href.to_string()))
            })
            .collect();

        let authors = author_line
            .split(", ")
            .map(clean_name)
            .filter(|name| !name.is_empty())
            .map(|name| {
                let mut author = Author::new(name);
                if let Some(href) = links.get(&author.name) {
                    author.link = Some(format!("{}{}", self.base_url, href));
                    author.author_id = href.get(AUTHOR_ID_SPAN).map(str::to_string);
                }
                author
            })
            .collect();

        Ok(ExtractedArticle { title, authors })
    }
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Parse(format!("selector `{}`: {:?}", css, e)))
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

fn clean_name(name: &str) -> String {
    name.replace(ELLIPSIS, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTI_AUTHOR_PAGE: &str = r#"
<html><body><div id="gs_res_ccl_mid">
  <div class="gs_r gs_or gs_scl">
    <div class="gs_ri">
      <h3 class="gs_rt"><a href="https://arxiv.org/abs/1">Deep Learning for X and Y</a></h3>
      <div class="gs_a">A Smith, B Lee… - arXiv preprint, 2023 - arxiv.org</div>
      <div class="gs_fmaa"><a href="/citations?user=AAAAAAAAAAAA&amp;hl=en">A Smith</a>, B Lee, <a href="/citations?user=CCCCCCCCCCCC&amp;hl=en">C Doe</a>, D Park…</div>
    </div>
  </div>
  <div class="gs_r gs_or gs_scl">
    <div class="gs_ri"><h3 class="gs_rt">Second result</h3></div>
  </div>
</div></body></html>
"#;

    const SINGLE_REFERENCE_PAGE: &str = r#"
<html><body>
  <div class="gs_ri">
    <h3 class="gs_rt">Shallow Learning</h3>
    <div class="gs_a"><a href="/citations?user=EEEEEEEEEEEE&amp;hl=en">E Wu</a>, F Kim - Journal of Things, 2022 - example.org</div>
  </div>
</body></html>
"#;

    #[test]
    fn test_extract_full_author_block() {
        let extracted = ArticleExtractor::default()
            .extract(MULTI_AUTHOR_PAGE.as_bytes())
            .unwrap();

        assert_eq!(extracted.title, "Deep Learning for X and Y");
        assert_eq!(
            extracted.author_names(),
            vec!["A Smith", "B Lee", "C Doe", "D Park"]
        );

        let smith = &extracted.authors[0];
        assert_eq!(smith.author_id.as_deref(), Some("AAAAAAAAAAAA"));
        assert_eq!(
            smith.link.as_deref(),
            Some("https://scholar.google.com/citations?user=AAAAAAAAAAAA&hl=en")
        );
        assert_eq!(extracted.authors[1].author_id, None);
        assert_eq!(extracted.authors[2].author_id.as_deref(), Some("CCCCCCCCCCCC"));
    }

    #[test]
    fn test_extract_single_reference_layout() {
        let extracted = ArticleExtractor::new("https://scholar.example")
            .extract(SINGLE_REFERENCE_PAGE.as_bytes())
            .unwrap();

        assert_eq!(extracted.title, "Shallow Learning");
        assert_eq!(extracted.author_names(), vec!["E Wu", "F Kim"]);
        assert_eq!(extracted.authors[0].author_id.as_deref(), Some("EEEEEEEEEEEE"));
        assert_eq!(
            extracted.authors[0].link.as_deref(),
            Some("https://scholar.example/citations?user=EEEEEEEEEEEE&hl=en")
        );
    }

    #[test]
    fn test_short_link_has_no_identifier() {
        let page = r#"<div class="gs_ri"><h3 class="gs_rt">T</h3>
            <div class="gs_fmaa"><a href="/x">G Ho</a></div></div>"#;
        let extracted = ArticleExtractor::default().extract(page.as_bytes()).unwrap();

        assert_eq!(extracted.authors[0].link.as_deref(), Some("https://scholar.google.com/x"));
        assert_eq!(extracted.authors[0].author_id, None);
    }

    #[test]
    fn test_missing_structure_is_parse_error() {
        let extractor = ArticleExtractor::default();

        let err = extractor.extract(b"<html><body>captcha</body></html>").unwrap_err();
        assert!(matches!(err, SourceError::Parse(ref m) if m.contains("gs_ri")));

        let err = extractor
            .extract(br#"<div class="gs_ri"><div class="gs_a">A</div></div>"#)
            .unwrap_err();
        assert!(matches!(err, SourceError::Parse(ref m) if m.contains("title")));

        let err = extractor
            .extract(br#"<div class="gs_ri"><h3 class="gs_rt">T</h3></div>"#)
            .unwrap_err();
        assert!(matches!(err, SourceError::Parse(ref m) if m.contains("author line")));
    }
}
