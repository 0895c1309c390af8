// Tree queries shared by the structural checks
// 结构化检查共用的语法树查询

use tree_sitter::Node;

/// Pre-order visit of every node under `root` (inclusive).
pub fn walk_nodes<'t>(root: Node<'t>, mut visit: impl FnMut(Node<'t>)) {
    let mut cursor = root.walk();
    loop {
        visit(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}

/// All nodes of one of the given kinds, in source order.
pub fn nodes_of_kind<'t>(root: Node<'t>, kinds: &[&str]) -> Vec<Node<'t>> {
    let mut nodes = Vec::new();
    walk_nodes(root, |node| {
        if kinds.contains(&node.kind()) {
            nodes.push(node);
        }
    });
    nodes
}

pub fn node_text<'s>(node: &Node, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

/// How a call target is spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callee<'t, 's> {
    /// `name(...)`
    Identifier(&'s str),
    /// `object.property(...)`
    Member { object: Node<'t>, property: &'s str },
    /// `import(...)`
    Import,
    Other,
}

impl<'t, 's> Callee<'t, 's> {
    /// Direct name or member property name.
    pub fn name(&self) -> Option<&'s str> {
        match self {
            Callee::Identifier(name) => Some(name),
            Callee::Member { property, .. } => Some(property),
            _ => None,
        }
    }
}

/// Resolve the callee of a `call_expression` or the constructor of a `new_expression`.
pub fn resolve_callee<'t, 's>(call: Node<'t>, source: &'s str) -> Callee<'t, 's> {
    let field = if call.kind() == "new_expression" {
        "constructor"
    } else {
        "function"
    };
    let Some(target) = call.child_by_field_name(field) else {
        return Callee::Other;
    };

    match target.kind() {
        "identifier" => Callee::Identifier(node_text(&target, source)),
        "import" => Callee::Import,
        "member_expression" => {
            let object = target.child_by_field_name("object");
            let property = target.child_by_field_name("property");
            match (object, property) {
                (Some(object), Some(property))
                    if matches!(
                        property.kind(),
                        "property_identifier" | "private_property_identifier"
                    ) =>
                {
                    Callee::Member {
                        object,
                        property: node_text(&property, source),
                    }
                }
                _ => Callee::Other,
            }
        }
        _ => Callee::Other,
    }
}

/// Arguments of a call or `new` expression, comments skipped.
pub fn call_arguments<'t>(call: Node<'t>) -> Vec<Node<'t>> {
    let Some(args) = call.child_by_field_name("arguments") else {
        return Vec::new();
    };
    let mut cursor = args.walk();
    args.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

/// Shape of an argument as seen by the taint heuristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentShape<'s> {
    /// A string literal, or a template without substitutions.
    Literal(String),
    /// A template with at least one `${...}`; holds the literal segments.
    Interpolated { segments: Vec<&'s str> },
    /// Anything else: identifiers, calls, concatenations, ...
    Dynamic,
}

pub fn classify_argument<'s>(node: &Node, source: &'s str) -> ArgumentShape<'s> {
    match node.kind() {
        "string" => ArgumentShape::Literal(string_value(node, source).unwrap_or_default()),
        "template_string" => {
            let (segments, substitutions) = template_segments(node, source);
            if substitutions == 0 {
                ArgumentShape::Literal(segments.concat())
            } else {
                ArgumentShape::Interpolated { segments }
            }
        }
        _ => ArgumentShape::Dynamic,
    }
}

/// Unescaped value of a `string` node.
pub fn string_value(node: &Node, source: &str) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    let raw = node_text(node, source);
    if raw.len() < 2 {
        return Some(String::new());
    }
    Some(unescape(&raw[1..raw.len() - 1]))
}

/// Literal pieces of a template string and the number of substitutions.
pub fn template_segments<'s>(node: &Node, source: &'s str) -> (Vec<&'s str>, usize) {
    let start = node.start_byte() + 1;
    let end = node.end_byte().saturating_sub(1).max(start);
    let mut segments = Vec::new();
    let mut substitutions = 0;
    let mut at = start;

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "template_substitution" {
            segments.push(source.get(at..child.start_byte()).unwrap_or(""));
            at = child.end_byte();
            substitutions += 1;
        }
    }
    segments.push(source.get(at..end).unwrap_or(""));
    (segments, substitutions)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            // line continuation
            Some('\n') => {}
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
