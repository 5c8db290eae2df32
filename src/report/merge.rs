use std::fs;
use std::path::Path;

use html5ever::{QualName, local_name, namespace_url, ns};
use kuchiki::traits::TendrilSink;
use kuchiki::{ElementData, NodeDataRef, NodeRef};
use regex::Regex;

use crate::error::ReportError;

const REPORT_TEMPLATE: &str = include_str!("../../templates/report_template.html");

/// Cross-frame link targets of one match, `<ref>-<side>.html#<n>`.
struct AnchorGrammar {
    pattern: Regex,
}

impl AnchorGrammar {
    fn new(match_ref: &str) -> Result<Self, ReportError> {
        let pattern = format!(r"^{}-([01])\.html#(\d+)$", regex::escape(match_ref));
        let pattern =
            Regex::new(&pattern).map_err(|err| ReportError::format(match_ref, err.to_string()))?;
        Ok(Self { pattern })
    }

    /// In-document target for `href`, or `None` when it is not a frame link.
    fn rewrite(&self, href: &str) -> Option<String> {
        let basename = href.rsplit('/').next()?;
        let captures = self.pattern.captures(basename)?;
        Some(format!("#match-{}-{}", &captures[1], &captures[2]))
    }
}

/// Merges the navigation frame and both side frames of `match_ref` from
/// `download_dir` into one document written to `destination`.
pub fn merge_case(
    download_dir: &Path,
    match_ref: &str,
    destination: &Path,
) -> Result<(), ReportError> {
    let merged = merge_frames(download_dir, match_ref)?;
    fs::write(destination, merged.to_string()).map_err(|err| ReportError::io(destination, err))
}

pub fn merge_frames(download_dir: &Path, match_ref: &str) -> Result<NodeRef, ReportError> {
    let anchors = AnchorGrammar::new(match_ref)?;
    let template = kuchiki::parse_html().one(REPORT_TEMPLATE);
    let frame_path = |suffix: &str| download_dir.join(format!("{match_ref}{suffix}.html"));

    let base_path = frame_path("");
    let base = load_document(&base_path)?;
    let title = select_one(&base, "head title", &base_path)?.as_node().text_contents();
    let template_title = select_one(&template, "head title", Path::new("template"))?;
    for child in template_title.as_node().children().collect::<Vec<_>>() {
        child.detach();
    }
    template_title.as_node().append(NodeRef::new_text(title));

    let top_path = frame_path("-top");
    let top = load_document(&top_path)?;
    let navigation = select_one(&top, "body center", &top_path)?;
    rewrite_links(navigation.as_node(), &anchors, &top_path)?;
    template_region(&template, "top")?.append(navigation.as_node().clone());

    for side in 0..2 {
        let side_path = frame_path(&format!("-{side}"));
        let document = load_document(&side_path)?;
        let body = select_one(&document, "body", &side_path)?;
        rewrite_links(body.as_node(), &anchors, &side_path)?;
        tag_jump_targets(body.as_node(), side);

        let region = template_region(&template, &format!("match-{side}"))?;
        region.append(empty_heading());
        for child in body.as_node().children().collect::<Vec<_>>() {
            region.append(child);
        }
    }

    Ok(template)
}

fn load_document(path: &Path) -> Result<NodeRef, ReportError> {
    let html = ReportError::read_to_string(path)?;
    Ok(kuchiki::parse_html().one(html))
}

fn select_one(
    document: &NodeRef,
    selector: &str,
    source: &Path,
) -> Result<NodeDataRef<ElementData>, ReportError> {
    document
        .select_first(selector)
        .map_err(|()| ReportError::format(source.display().to_string(), format!("no `{selector}`")))
}

fn template_region(template: &NodeRef, id: &str) -> Result<NodeRef, ReportError> {
    select_one(template, &format!("#{id}"), Path::new("template"))
        .map(|region| region.as_node().clone())
}

fn rewrite_links(
    root: &NodeRef,
    anchors: &AnchorGrammar,
    source: &Path,
) -> Result<(), ReportError> {
    let links = root
        .select("a[href]")
        .map_err(|()| ReportError::format(source.display().to_string(), "invalid link selector"))?
        .collect::<Vec<_>>();

    for link in links {
        let mut attributes = link.attributes.borrow_mut();
        let href = attributes.get("href").unwrap_or_default().to_string();
        let target = anchors.rewrite(&href).ok_or_else(|| {
            ReportError::format(
                source.display().to_string(),
                format!("link does not point into the match frames: {href:?}"),
            )
        })?;
        attributes.insert("href", target);
        attributes.insert("target", "_self".to_string());
    }
    Ok(())
}

/// Gives every `<a name=n>` the id `match-<side>-<n>` so rewritten links resolve.
fn tag_jump_targets(root: &NodeRef, side: usize) {
    let Ok(targets) = root.select("a[name]") else {
        return;
    };
    for target in targets.collect::<Vec<_>>() {
        let mut attributes = target.attributes.borrow_mut();
        if let Some(name) = attributes.get("name").map(str::to_string) {
            attributes.insert("id", format!("match-{side}-{name}"));
        }
    }
}

fn empty_heading() -> NodeRef {
    NodeRef::new_element(QualName::new(None, ns!(html), local_name!("h3")), None)
}
