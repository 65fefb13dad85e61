use std::fmt::Display;

pub use annotate_snippets::Renderer;
use annotate_snippets::{Level, Snippet};
use tessera_syntax::{SyntaxNode, WalkEvent};
pub use text_size::TextRange;

#[salsa::accumulator]
pub struct Diagnostic {
    message: String,
    range: TextRange,
}

impl Diagnostic {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn range(&self) -> TextRange {
        self.range
    }

    pub fn error(message: impl Into<String>, range: TextRange) -> Self {
        Self { message: message.into(), range }
    }

    pub fn render<'a>(
        &'a self,
        renderer: &'a Renderer,
        path: &'a str,
        text: &'a str,
    ) -> impl Display + 'a {
        let message = Level::Error.title(&self.message).snippet(
            Snippet::source(text)
                .origin(path)
                .annotation(Level::Error.span(self.range.into()).label("here"))
                .fold(true),
        );
        renderer.render(message)
    }
}

/// One diagnostic per recovery site under `root`: skipped input (`ERROR`
/// nodes, reported once at the outermost) and inserted `MISSING` tokens.
pub fn syntax_errors(root: &SyntaxNode, source: &[u8]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut walk = root.preorder();
    while let Some(event) = walk.next() {
        let WalkEvent::Enter(node) = event else { continue };
        if !node.has_error() {
            walk.skip_subtree();
        } else if node.is_missing() {
            let kind = node.kind();
            diagnostics.push(Diagnostic::error(format!("missing `{kind}`"), node.trimmed_range()));
        } else if node.is_error() {
            let text = node.utf8_text(source).unwrap_or_default();
            let message = match text.lines().next().map(str::trim) {
                Some(line) if !line.is_empty() => format!("unexpected `{line}`"),
                _ => "unexpected input".to_owned(),
            };
            diagnostics.push(Diagnostic::error(message, node.trimmed_range()));
            walk.skip_subtree();
        }
    }
    diagnostics
}

#[cfg(test)]
mod tests;
