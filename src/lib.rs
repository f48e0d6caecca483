//! Whole-program, ahead-of-time compiler for the etapa7 language, emitting
//! x86-64 System V assembly for Linux.
//!
//! The pipeline is a straight line: source text is parsed (with [pest])
//! into an AST, the AST is checked by [`semantics`](semantics/index.html),
//! lowered to three-address code by [`tac::gen`](tac/gen/index.html),
//! optionally rewritten by [`tac::opt`](tac/opt/index.html), lowered to an
//! assembly unit by [`x86_64::gen`](x86_64/gen/index.html), optionally
//! cleaned up by [`x86_64::opt`](x86_64/opt/index.html) and finally
//! rendered as GAS AT&T text. The emitted `.s` file assembles and links
//! with the host `cc`.
//!
//! # The etapa7 Language
//!
//! A program is a sequence of top-level declarations over three base types:
//!
//! Type   | Meaning
//! -------|--------------------------
//! `cara` | single byte character
//! `inte` | 64-bit signed integer
//! `real` | double-precision float
//!
//! Declaration forms:
//!
//! Form                             | Meaning
//! ---------------------------------|----------------------------------
//! `inte x = 5;`                    | global scalar with constant initializer
//! `inte v[10] 1 2 3;`              | global vector, trailing elements zeroed
//! `inte f(inte a, cara b) { ... }` | function with positional parameters
//!
//! Statements: assignment (`x = e;`, `v[i] = e;`), `se (c) entaum s`
//! optionally followed by `senaum s`, `enquanto (c) s`, `retorne e;`,
//! formatted output `escreva arg arg ... ;` (expressions and string
//! literals), expression statements and `{ }` blocks. The `entrada`
//! expression reads one integer from standard input, skipping anything that
//! is not a sign or digit.
//!
//! Operators, loosest to tightest: `|`, `&`, the comparisons `< > <= >= ==
//! !=`, `+ -`, `* /`, unary `~`. Comparisons and logical operators produce
//! a boolean that only conditions and logical operators accept.
//!
//! [pest]: https://docs.rs/pest/

pub mod ast;
pub mod consteval;
pub mod parser;
pub mod semantics;
pub mod tac;
pub mod x86_64;
