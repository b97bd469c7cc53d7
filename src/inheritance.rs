use std::collections::HashMap;

use crate::ast::Node;

/// Block bodies by name, borrowed from the templates of an inheritance chain.
pub(crate) type Blocks<'t> = HashMap<&'t str, &'t [Node]>;

/// The `extends` target of a template, if its first substantive node is an `extends` tag.
///
/// Leading literals made only of whitespace are skipped; anything else before the tag means
/// the template does not extend a parent.
pub(crate) fn extends_target(nodes: &[Node]) -> Option<&str> {
    nodes
        .iter()
        .find(|node| !matches!(node, Node::Literal(text) if text.trim().is_empty()))
        .and_then(|node| match node {
            Node::Extends { target } => Some(template_name(target)),
            Node::Literal(_)
            | Node::Variable(_)
            | Node::If { .. }
            | Node::ElseIf { .. }
            | Node::Else { .. }
            | Node::For { .. }
            | Node::Block { .. }
            | Node::Include { .. } => None,
        })
}

/// Strip the quotes around a template name given to `extends` or `include`.
pub(crate) fn template_name(target: &str) -> &str {
    target.trim().trim_matches(|c| c == '"' || c == '\'')
}

/// Collect every `block` in `nodes`, at any depth, into `blocks`. Blocks already present are
/// kept, so collecting the most derived template first gives it precedence.
pub(crate) fn collect_blocks<'t>(nodes: &'t [Node], blocks: &mut Blocks<'t>) {
    let mut own = Blocks::new();
    walk(nodes, &mut own);
    for (name, body) in own {
        blocks.entry(name).or_insert(body);
    }
}

/// Within one template the last definition of a name wins.
fn walk<'t>(nodes: &'t [Node], blocks: &mut Blocks<'t>) {
    for node in nodes {
        if let Node::Block { name, body } = node {
            blocks.insert(name.as_str(), body.as_slice());
        }
        walk(node.body(), blocks);
    }
}
