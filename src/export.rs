//! Rendering a finished collection as JSON, BibTeX, or Markdown

use thiserror::Error;

use crate::models::{Paper, PaperCollection};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Bibtex,
    Markdown,
}

impl ExportFormat {
    pub fn parse(raw: &str) -> Option<ExportFormat> {
        match raw.trim().to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "bibtex" | "bib" => Some(ExportFormat::Bibtex),
            "markdown" | "md" => Some(ExportFormat::Markdown),
            _ => None,
        }
    }
}

pub fn render(collection: &PaperCollection, format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(collection)?),
        ExportFormat::Bibtex => Ok(render_bibtex(collection)),
        ExportFormat::Markdown => Ok(render_markdown(collection)),
    }
}

fn render_bibtex(collection: &PaperCollection) -> String {
    collection
        .papers
        .iter()
        .map(bibtex_entry)
        .collect::<Vec<String>>()
        .join("\n\n")
}

fn bibtex_entry(paper: &Paper) -> String {
    let mut fields = vec![format!("  title = {{{}}}", escape_braces(&paper.title))];
    if !paper.authors.is_empty() {
        fields.push(format!(
            "  author = {{{}}}",
            escape_braces(&paper.authors.join(" and "))
        ));
    }
    if let Some(year) = paper.year {
        fields.push(format!("  year = {{{}}}", year));
    }
    if let Some(venue) = &paper.venue {
        fields.push(format!("  journal = {{{}}}", escape_braces(venue)));
    }
    if let Some(doi) = &paper.doi {
        fields.push(format!("  doi = {{{}}}", doi));
    }
    if let Some(url) = &paper.full_text_url {
        fields.push(format!("  url = {{{}}}", url));
    }

    format!("@article{{{},\n{}\n}}", cite_key(paper), fields.join(",\n"))
}

/// `lastname-year-id` with everything non-alphanumeric squeezed out
fn cite_key(paper: &Paper) -> String {
    let surname = paper
        .authors
        .first()
        .and_then(|author| author.split_whitespace().last())
        .unwrap_or("unknown")
        .to_lowercase();
    let surname: String = surname.chars().filter(|c| c.is_alphanumeric()).collect();

    let year = paper
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "nd".to_string());

    let id: String = paper
        .id
        .chars()
        .filter(|c| c.is_alphanumeric())
        .take(8)
        .collect();

    format!("{}-{}-{}", surname, year, id)
}

fn escape_braces(text: &str) -> String {
    text.replace('{', "\\{").replace('}', "\\}")
}

fn render_markdown(collection: &PaperCollection) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Research results: {}\n\n", collection.metadata.query));
    out.push_str(&format!(
        "{} papers shown ({} found before relevance filtering).\n\n",
        collection.papers.len(),
        collection.metadata.total_found
    ));

    if !collection.facets.key_themes.is_empty() {
        out.push_str(&format!(
            "**Key themes:** {}\n\n",
            collection.facets.key_themes.join(", ")
        ));
    }
    if !collection.facets.top_authors.is_empty() {
        out.push_str(&format!(
            "**Top authors:** {}\n\n",
            collection.facets.top_authors.join(", ")
        ));
    }

    out.push_str("## Papers\n\n");
    for (index, paper) in collection.papers.iter().enumerate() {
        out.push_str(&format!("### {}. {}\n\n", index + 1, paper.title));

        let mut line = Vec::new();
        if !paper.authors.is_empty() {
            line.push(paper.authors.join(", "));
        }
        if let Some(venue) = &paper.venue {
            line.push(venue.clone());
        }
        if let Some(year) = paper.year {
            line.push(year.to_string());
        }
        line.push(format!("{} citations", paper.citation_count));
        out.push_str(&format!("_{}_\n\n", line.join(" · ")));

        out.push_str(&format!(
            "Relevance: {:.2} — {}\n\n",
            paper.relevance_score, paper.relevance_reason
        ));

        if let Some(doi) = &paper.doi {
            out.push_str(&format!("DOI: [{}](https://doi.org/{})\n\n", doi, doi));
        } else if let Some(url) = &paper.full_text_url {
            out.push_str(&format!("Link: {}\n\n", url));
        }

        if let Some(snippet) = &paper.snippet {
            out.push_str(&format!("> {}\n\n", snippet));
        }
    }

    out
}
