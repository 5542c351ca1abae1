//! Recursive crawl of an author's citation graph.
//!
//! For one author the crawler walks author → articles → citations → authors:
//!
//! 1. the author's articles, newest first (paginated);
//! 2. for each article with citations, the citing works (paginated);
//! 3. for each citing work, a single search for its own result page, whose
//!    rendered HTML carries the full author list the preview truncates;
//! 4. for each of those authors with a profile, the profile itself.
//!
//! Every response is cached by [`ResultCache`], and every finished article is
//! written out as a self-contained record before the next one starts, so an
//! interrupted run resumes at the first incomplete unit.
//!
//! # Output layout
//!
//! ```text
//! <output>/<author_id>/
//!   articles_0-20.yaml ...
//!   results.yaml                       all articles with nested citations
//!   report.yaml                        CrawlReport
//!   <article title> (<id>)/
//!     organic_results_0-20.yaml ...
//!     results.yaml                     the article with its citations
//!     <citation title> (<result id>)/
//!       article.yaml                   single-work search
//!       article.html                   its rendered page
//!       <author_id>.yaml               author profiles
//! ```

mod extract;
mod reconcile;
mod report;

pub use extract::{ArticleExtractor, ExtractedArticle, SCHOLAR_URL};
pub use reconcile::{author_warning, reconcile, title_warning};
pub use report::{CountMismatch, CrawlReport, Unit, UnitFailure};

use std::path::{Path, PathBuf};

use crate::models::{Article, Citation, ProfileResponse, Query, SearchDocument};
use crate::sources::SourceError;
use crate::ui;
use crate::utils::{save_yaml, ResultCache};

/// Engine listing an author's articles and profile
pub const AUTHOR_ENGINE: &str = "google_scholar_author";

/// Engine for free-text and "cited by" searches
pub const SEARCH_ENGINE: &str = "google_scholar";

/// Record file of an author or article directory
pub const RESULTS_FILE: &str = "results.yaml";

/// Crawl report file of an author directory
pub const REPORT_FILE: &str = "report.yaml";

/// Options of a crawl run
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Root of the cache tree
    pub output_dir: PathBuf,

    /// Fetch everything again instead of using persisted results
    pub overwrite: bool,

    /// Title characters kept in directory names
    pub max_title_len: usize,

    /// Draw a progress bar over the articles
    pub show_progress: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("results"),
            overwrite: false,
            max_title_len: 30,
            show_progress: false,
        }
    }
}

/// Result of crawling one author
#[derive(Debug, Clone)]
pub struct AuthorCrawl {
    pub articles: Vec<Article>,
    pub report: CrawlReport,
}

/// Directory name for an entry: truncated title plus identifier
pub fn entry_dir_name(title: &str, id: &str, max_title_len: usize) -> String {
    let title: String = title.chars().take(max_title_len).collect();
    format!("{} ({})", sanitize(&title), sanitize(id))
}

fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Walks the citation graph of one author at a time
#[derive(Debug, Clone)]
pub struct CitationGraphCrawler {
    cache: ResultCache,
    extractor: ArticleExtractor,
    options: CrawlOptions,
}

impl CitationGraphCrawler {
    pub fn new(cache: ResultCache, extractor: ArticleExtractor, options: CrawlOptions) -> Self {
        Self {
            cache,
            extractor,
            options,
        }
    }

    pub fn options(&self) -> &CrawlOptions {
        &self.options
    }

    /// Cache directory of an author
    pub fn author_dir(&self, author_id: &str) -> PathBuf {
        self.options.output_dir.join(author_id)
    }

    /// Crawl every article of `author_id`.
    ///
    /// Remote and storage errors abort the run; pages persisted so far stay
    /// valid for the next one. Parse errors only skip the unit they occurred in.
    pub async fn crawl_author(&self, author_id: &str) -> Result<AuthorCrawl, SourceError> {
        let author_dir = self.author_dir(author_id);
        let query = Query::engine(AUTHOR_ENGINE)
            .param("author_id", author_id)
            .param("sort", "pubdate");

        let items = self
            .cache
            .fetch_items(&query, "articles", &author_dir, self.options.overwrite)
            .await?;
        tracing::info!("Num. of articles: {}", items.len());

        let mut report = CrawlReport::new(author_id);
        let progress = ui::progress_bar(items.len() as u64, "Articles", self.options.show_progress);
        let mut articles = Vec::with_capacity(items.len());

        for (index, item) in items.into_iter().enumerate() {
            progress.inc(1);
            let article = match Article::from_item(item) {
                Ok(article) => article,
                Err(e) => {
                    report.record_failure(Unit::Article, "?", &format!("#{}", index), &e);
                    continue;
                }
            };

            let (title, id) = (article.title.clone(), article.citation_id.clone());
            match self.crawl_article(article, &author_dir, &mut report).await {
                Ok(article) => {
                    report.add_article(&article);
                    articles.push(article);
                }
                Err(e) if !e.is_fatal_for_run() => {
                    report.record_failure(Unit::Article, &title, &id, &e);
                }
                Err(e) => {
                    progress.abandon();
                    return Err(e);
                }
            }
        }
        progress.finish_and_clear();

        save_yaml(&articles, &author_dir.join(RESULTS_FILE))?;
        save_yaml(&report, &author_dir.join(REPORT_FILE))?;
        Ok(AuthorCrawl { articles, report })
    }

    async fn crawl_article(
        &self,
        mut article: Article,
        author_dir: &Path,
        report: &mut CrawlReport,
    ) -> Result<Article, SourceError> {
        let declared = article.declared_citations();
        tracing::info!(
            "-- Article: {} | Num. of citations: {}",
            article.title,
            declared
        );

        let article_dir = author_dir.join(entry_dir_name(
            &article.title,
            article.short_id(),
            self.options.max_title_len,
        ));

        match article.cited_by.cites_id.clone() {
            Some(cites_id) if declared > 0 => {
                article.citations = self
                    .crawl_citations(&cites_id, &article_dir, report)
                    .await?;

                if article.citations.len() != declared {
                    tracing::warn!(
                        "Num. of citations mismatch: {} and {}",
                        article.citations.len(),
                        declared
                    );
                    report.count_mismatches.push(CountMismatch {
                        article: article.title.clone(),
                        citation_id: article.citation_id.clone(),
                        declared,
                        retrieved: article.citations.len(),
                    });
                }
            }
            None if declared > 0 => {
                // The article is kept; only its citations are lost
                let error = SourceError::Parse(format!(
                    "`{}` declares {} citations but no citation-group identifier",
                    article.title, declared
                ));
                report.record_failure(Unit::Article, &article.title, &article.citation_id, &error);
                article.citations.clear();
            }
            _ => article.citations.clear(),
        }

        save_yaml(&article, &article_dir.join(RESULTS_FILE))?;
        Ok(article)
    }

    async fn crawl_citations(
        &self,
        cites_id: &str,
        article_dir: &Path,
        report: &mut CrawlReport,
    ) -> Result<Vec<Citation>, SourceError> {
        let query = Query::engine(SEARCH_ENGINE)
            .param("sort", "pubdate")
            .param("cites", cites_id);
        let items = self
            .cache
            .fetch_items(&query, "organic_results", article_dir, self.options.overwrite)
            .await?;

        let mut citations = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let mut citation = match Citation::from_item(item) {
                Ok(citation) => citation,
                Err(e) => {
                    report.record_failure(Unit::Citation, "?", &format!("{}#{}", cites_id, index), &e);
                    continue;
                }
            };

            match self.resolve_citation(&mut citation, article_dir, report).await {
                Ok(()) => {}
                Err(e) if !e.is_fatal_for_run() => {
                    report.record_failure(Unit::Citation, &citation.title, &citation.result_id, &e);
                }
                Err(e) => return Err(e),
            }
            citations.push(citation);
        }

        Ok(citations)
    }

    /// Recover the full author list of a citing work and enrich its authors
    async fn resolve_citation(
        &self,
        citation: &mut Citation,
        article_dir: &Path,
        report: &mut CrawlReport,
    ) -> Result<(), SourceError> {
        let overwrite = self.options.overwrite;
        let citation_dir = article_dir.join(entry_dir_name(
            &citation.title,
            &citation.result_id,
            self.options.max_title_len,
        ));

        // The preview only lists the first few authors
        let partial = citation.partial_author_names().join(" ");
        let text = format!("{} {}", citation.title, partial);
        let query = Query::engine(SEARCH_ENGINE)
            .param("q", text.trim())
            .param("sort", "pubdate");

        let document = self
            .cache
            .fetch_document(&query, &citation_dir.join("article.yaml"), overwrite)
            .await?;
        let page_url = SearchDocument::from_document(document)?
            .search_metadata
            .raw_html_file;
        let page = self
            .cache
            .fetch_page(&page_url, &citation_dir.join("article.html"), overwrite)
            .await?;
        let extracted = self.extractor.extract(&page)?;

        citation.warnings = reconcile(citation, &extracted);
        for warning in &citation.warnings {
            tracing::warn!("{}", warning);
        }

        tracing::info!(
            "---- Citation: {} | Num. of authors: {}",
            citation.title,
            extracted.authors.len()
        );

        let mut authors = extracted.authors;
        for author in authors.iter_mut() {
            let Some(author_id) = author.author_id.clone() else {
                continue;
            };
            let query = Query::engine(AUTHOR_ENGINE).param("author_id", author_id.as_str());
            let location = citation_dir.join(format!("{}.yaml", sanitize(&author_id)));

            let profile = self
                .cache
                .fetch_document(&query, &location, overwrite)
                .await
                .and_then(ProfileResponse::from_document);
            match profile {
                Ok(profile) => author.apply_profile(profile),
                Err(e) if !e.is_fatal_for_run() => {
                    report.record_failure(Unit::Author, &author.name, &author_id, &e);
                }
                Err(e) => return Err(e),
            }
        }
        citation.authors = authors;

        Ok(())
    }
}
