// src/macros.rs
#[macro_export]
macro_rules! s {
    // String shorthand
    () => {
        ::std::string::String::new()
    };
    ($expr:expr) => {
        ::std::string::String::from($expr)
    };
}

#[macro_export]
macro_rules! join {
    // Concatenate string-ish pieces into one owned String (URL building mostly)
    ($first:expr $(, $rest:expr)+ $(,)?) => {{
        let mut s = ::std::string::String::from($first);
        $(
            s.push_str($rest);
        )+
        s
    }};
}

/// Compile a CSS selector once and hand out a `&'static Selector`.
/// Only for literal selectors; a typo is a programming error caught by the parser tests.
#[macro_export]
macro_rules! selector {
    ($css:literal) => {{
        static SEL: ::std::sync::LazyLock<::scraper::Selector> = ::std::sync::LazyLock::new(|| {
            ::scraper::Selector::parse($css).expect(concat!("invalid selector: ", $css))
        });
        &*SEL
    }};
}

/// Same as `selector!` for regular expressions.
#[macro_export]
macro_rules! regex {
    ($re:literal) => {{
        static RE: ::std::sync::LazyLock<::regex::Regex> = ::std::sync::LazyLock::new(|| {
            ::regex::Regex::new($re).expect(concat!("invalid regex: ", $re))
        });
        &*RE
    }};
}
