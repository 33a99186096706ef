use proc_macro::{Delimiter, TokenStream, TokenTree};

/// Options accepted by `#[orbis::main]` and `#[orbis::test]`.
///
/// Parsed from a comma-separated list such as `debug` or `debug = false`.
#[derive(Default)]
pub(crate) struct LoopOptions {
    pub(crate) debug: Option<bool>,
}

impl LoopOptions {
    pub(crate) fn parse(attr: TokenStream) -> Self {
        let mut options = Self::default();

        for part in attr.to_string().split(',') {
            let part = part.trim();

            if let Some(value) = part.strip_prefix("debug") {
                let value = value.trim_start().trim_start_matches('=').trim();
                options.debug = Some(value != "false");
            }
        }

        options
    }

    /// Source of the expression building the loop.
    pub(crate) fn builder(&self) -> String {
        let mut builder = String::from("::orbis::LoopBuilder::new()");

        if let Some(debug) = self.debug {
            builder.push_str(&format!(".debug({debug})"));
        }

        builder.push_str(".build()");
        builder
    }
}

/// Removes the `async` keyword from a function signature.
pub(crate) fn strip_async(tokens: &mut Vec<TokenTree>) {
    if let Some(pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    {
        tokens.remove(pos);
    }
}

/// Position of the function body, the last brace-delimited group.
pub(crate) fn body_position(tokens: &[TokenTree]) -> Option<usize> {
    tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
}

/// Returns `true` if the signature before `body` declares a return type.
pub(crate) fn returns_value(tokens: &[TokenTree], body: usize) -> bool {
    tokens[..body].windows(2).any(|pair| match pair {
        [TokenTree::Punct(dash), TokenTree::Punct(arrow)] => {
            dash.as_char() == '-' && arrow.as_char() == '>'
        }
        _ => false,
    })
}

/// Builds a `compile_error!` invocation reporting `message`.
pub(crate) fn compile_error(message: &str) -> TokenStream {
    format!("compile_error!({message:?});")
        .parse()
        .unwrap_or_default()
}
