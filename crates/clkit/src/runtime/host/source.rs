//! Kernel-declaration scanner for OpenCL C sources.
//!
//! The host runtime does not compile OpenCL C. Building a program only has
//! to find the `__kernel` entry points, their parameter counts, and reject
//! sources that are structurally broken (unbalanced brackets, unterminated
//! comments or literals, malformed declarations).

/// A kernel entry point found in a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelDecl {
    pub name: String,
    pub arity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Punct(char),
}

/// Scan one source for kernel declarations.
///
/// On failure the error is a one-line build-log message.
pub fn scan_kernels(source: &str) -> Result<Vec<KernelDecl>, String> {
    let tokens = tokenize(source)?;
    check_balanced(&tokens)?;

    let mut decls = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if matches!(&tokens[i], Token::Ident(id) if id == "__kernel" || id == "kernel") {
            let (decl, next) = parse_decl(&tokens, i + 1)?;
            decls.push(decl);
            i = next;
        } else {
            i += 1;
        }
    }
    Ok(decls)
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1usize;
    let mut at_line_start = true;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                at_line_start = true;
                i += 1;
                continue;
            }
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '#' if at_line_start => {
                // Preprocessor line, honouring backslash continuations.
                while i < chars.len() && chars[i] != '\n' {
                    if chars[i] == '\\' && chars.get(i + 1) == Some(&'\n') {
                        line += 1;
                        i += 1;
                    }
                    i += 1;
                }
                continue;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let start = line;
                i += 2;
                loop {
                    match chars.get(i) {
                        None => return Err(format!("line {start}: unterminated comment")),
                        Some('*') if chars.get(i + 1) == Some(&'/') => {
                            i += 2;
                            break;
                        }
                        Some('\n') => {
                            line += 1;
                            i += 1;
                        }
                        Some(_) => i += 1,
                    }
                }
                continue;
            }
            '"' | '\'' => {
                let quote = c;
                i += 1;
                loop {
                    match chars.get(i) {
                        None | Some('\n') => {
                            return Err(format!("line {line}: unterminated literal"));
                        }
                        Some('\\') => i += 2,
                        Some(&q) if q == quote => {
                            i += 1;
                            break;
                        }
                        Some(_) => i += 1,
                    }
                }
                tokens.push(Token::Punct(quote));
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            c => {
                tokens.push(Token::Punct(c));
                i += 1;
            }
        }
        at_line_start = false;
    }
    Ok(tokens)
}

fn check_balanced(tokens: &[Token]) -> Result<(), String> {
    let mut stack = Vec::new();
    for token in tokens {
        let Token::Punct(c) = token else { continue };
        match c {
            '(' | '[' | '{' => stack.push(*c),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(open) {
                    return Err(format!("unbalanced '{c}'"));
                }
            }
            _ => {}
        }
    }
    match stack.last() {
        Some(open) => Err(format!("unclosed '{open}'")),
        None => Ok(()),
    }
}

fn parse_decl(tokens: &[Token], mut i: usize) -> Result<(KernelDecl, usize), String> {
    // Optional `__attribute__((...))` blocks before the return type.
    while matches!(tokens.get(i), Some(Token::Ident(id)) if id == "__attribute__") {
        i = skip_group(tokens, i + 1)?;
    }
    match tokens.get(i) {
        Some(Token::Ident(ret)) if ret == "void" => i += 1,
        _ => return Err("kernel functions must return void".to_string()),
    }
    let name = match tokens.get(i) {
        Some(Token::Ident(name)) => name.clone(),
        _ => return Err("expected kernel name".to_string()),
    };
    i += 1;
    if tokens.get(i) != Some(&Token::Punct('(')) {
        return Err(format!("expected '(' after kernel '{name}'"));
    }
    let close = skip_group(tokens, i)?;
    let arity = count_params(&tokens[i + 1..close - 1]);
    if tokens.get(close) != Some(&Token::Punct('{')) {
        return Err(format!("kernel '{name}' has no body"));
    }
    Ok((KernelDecl { name, arity }, close))
}

/// Skip a parenthesised group starting at `open`, returning the index just
/// past its closing parenthesis.
fn skip_group(tokens: &[Token], open: usize) -> Result<usize, String> {
    if tokens.get(open) != Some(&Token::Punct('(')) {
        return Err("expected '('".to_string());
    }
    let mut depth = 0usize;
    for (offset, token) in tokens[open..].iter().enumerate() {
        match token {
            Token::Punct('(') => depth += 1,
            Token::Punct(')') => {
                depth -= 1;
                if depth == 0 {
                    return Ok(open + offset + 1);
                }
            }
            _ => {}
        }
    }
    Err("unclosed '('".to_string())
}

fn count_params(params: &[Token]) -> u32 {
    match params {
        [] => 0,
        [Token::Ident(v)] if v == "void" => 0,
        _ => {
            let mut depth = 0i32;
            let mut count = 1;
            for token in params {
                match token {
                    Token::Punct('(' | '[' | '{') => depth += 1,
                    Token::Punct(')' | ']' | '}') => depth -= 1,
                    Token::Punct(',') if depth == 0 => count += 1,
                    _ => {}
                }
            }
            count
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_kernels_and_arity() {
        let src = r#"
            #define N 4
            // helper
            int twice(int x) { return 2 * x; }

            __kernel void vector_add(__global const int *a,
                                     __global const int *b,
                                     __global int *c,
                                     const int n) {
                int i = get_global_id(0);
                if (i < n) c[i] = a[i] + b[i];
            }

            kernel void noop(void) {}
        "#;
        let decls = scan_kernels(src).unwrap();
        assert_eq!(
            decls,
            vec![
                KernelDecl { name: "vector_add".into(), arity: 4 },
                KernelDecl { name: "noop".into(), arity: 0 },
            ]
        );
    }

    #[test]
    fn skips_attributes() {
        let src = "__kernel __attribute__((reqd_work_group_size(1, 1, 1))) void k(int a) {}";
        assert_eq!(scan_kernels(src).unwrap()[0].arity, 1);
    }

    #[test]
    fn ignores_keywords_in_comments_and_strings() {
        let src = "/* __kernel void fake(int a) {} */ void f() { char *s = \"__kernel\"; }";
        assert!(scan_kernels(src).unwrap().is_empty());
    }

    #[test]
    fn rejects_broken_sources() {
        assert!(scan_kernels("__kernel void k(int a) {").is_err());
        assert!(scan_kernels("__kernel void k(int a) { ) }").is_err());
        assert!(scan_kernels("/* never closed").is_err());
        assert!(scan_kernels("__kernel int k(int a) { return a; }").is_err());
        assert!(scan_kernels("__kernel void k(int a);").is_err());
    }
}
