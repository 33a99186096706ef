mod utils;

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};
use utils::LoopOptions;

/// Runs an `async fn main` on a fresh `orbis::LocalLoop`.
///
/// A `main` declaring a return type must return
/// `Result<T, orbis::Error>`, and gets the outcome of the body. Otherwise the
/// body may still use `?`, and an error ends the process with status 1.
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let options = LoopOptions::parse(attr);

    let wrapped = wrap(item, &options, |block| {
        format!(
            "{{
            let __result = {}
                .block_on(async move {{
                    {{ {} }};
                    ::core::result::Result::Ok::<(), ::orbis::Error>(())
                }});
            if let ::core::result::Result::Err(error) = __result {{
                ::std::eprintln!(\"Error: {{error}}\");
                ::std::process::exit(1);
            }}
        }}",
            options.builder(),
            block
        )
    });

    match wrapped {
        Some(tokens) => tokens,
        None => utils::compile_error("#[orbis::main] expects a function with a body"),
    }
}

/// Runs an `async fn` test on a fresh `orbis::LocalLoop`.
///
/// Tests declaring a return type must return `Result<T, orbis::Error>`.
/// Otherwise the body may still use `?`, and an error fails the test.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let options = LoopOptions::parse(attr);

    let wrapped = wrap(item, &options, |block| {
        format!(
            "{{
            let __result = {}
                .block_on(async move {{
                    {{ {} }};
                    ::core::result::Result::Ok::<(), ::orbis::Error>(())
                }});
            if let ::core::result::Result::Err(error) = __result {{
                ::std::panic!(\"test body failed: {{error}}\");
            }}
        }}",
            options.builder(),
            block
        )
    });

    let Some(tokens) = wrapped else {
        return utils::compile_error("#[orbis::test] expects a function with a body");
    };

    let test_attr: TokenStream = "#[test]".parse().unwrap_or_default();
    let mut result: Vec<TokenTree> = test_attr.into_iter().collect();
    result.extend(tokens);

    result.into_iter().collect()
}

/// Rewrites the body of an `async fn` to run on a new loop.
///
/// Functions with a return type hand the outcome of the body straight back;
/// the others go through `unit_body`.
fn wrap(
    item: TokenStream,
    options: &LoopOptions,
    unit_body: impl FnOnce(&str) -> String,
) -> Option<TokenStream> {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    utils::strip_async(&mut tokens);
    let pos = utils::body_position(&tokens)?;

    let block = match &tokens[pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => return None,
    };

    let new_block = if utils::returns_value(&tokens, pos) {
        format!(
            "{{
            {}
                .block_on(async move {{ {} }})
        }}",
            options.builder(),
            block
        )
    } else {
        unit_body(&block)
    };

    let stream: TokenStream = new_block.parse().ok()?;
    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, stream));

    Some(tokens.into_iter().collect())
}
