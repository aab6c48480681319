//! Recursive-descent parser producing a per-file [`Program`]
//!
//! Top level: `inherit "<path>";`, variable declarations, and function
//! definitions. Expression parsing is precedence-climbing, lowest first:
//! assignment, `||`, `&&`, equality, relational, additive, multiplicative,
//! unary, postfix (call, index, slice, arrow call), primary.

use std::rc::Rc;

use crate::ast::{AssignOp, BinOp, Expr, FunctionDef, Param, Program, Stmt, Type, VarDecl};
use crate::errors::ParseError;
use crate::lexer::{Lexer, Tok, Token};

/// Hard cap on expression/statement nesting so that hostile sources cannot
/// overflow the host stack during parsing or evaluation.
const MAX_NESTING: usize = 200;

pub struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
    depth: usize,
}

/// Convenience entry: lex and parse one source file.
pub fn parse_source(src: &str) -> Result<Program, ParseError> {
    let tokens = Lexer::new(src)
        .tokenize()
        .map_err(|e| ParseError::new(e.line, e.reason.clone(), "<lex>"))?;
    Parser::new(tokens).parse_program()
}

impl Parser {
    pub fn new(tokens: Vec<Tok>) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn current(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|t| t.line)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, reason: impl Into<String>) -> ParseError {
        ParseError::new(self.line(), reason, self.current().to_string())
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        if self.current() == &expected {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected `{}`", expected)))
        }
    }

    fn eat(&mut self, tok: Token) -> bool {
        if self.current() == &tok {
            self.advance();
            true
        } else {
            false
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.err("nesting too deep"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn type_of(tok: &Token) -> Option<Type> {
        let ty = match tok {
            Token::Void => Type::Void,
            Token::IntKw => Type::Int,
            Token::StringKw => Type::String,
            Token::ObjectKw => Type::Object,
            Token::MappingKw => Type::Mapping,
            Token::Mixed => Type::Mixed,
            _ => return None,
        };
        Some(ty)
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        match self.current().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.err("expected identifier")),
        }
    }

    // ---- top level ----

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut program = Program::default();

        while self.current() != &Token::Eof {
            match self.current() {
                Token::Inherit => {
                    self.advance();
                    let path = match self.advance() {
                        Token::StrLit(s) => s,
                        other => {
                            return Err(ParseError::new(
                                self.line(),
                                "expected string after inherit",
                                other.to_string(),
                            ))
                        }
                    };
                    self.expect(Token::Semi)?;
                    if program.inherit.is_some() {
                        return Err(self.err("multiple inherit declarations"));
                    }
                    if !program.vars.is_empty() || !program.functions.is_empty() {
                        return Err(self.err("inherit must precede declarations"));
                    }
                    program.inherit = Some(path);
                }
                _ => self.parse_declaration(&mut program)?,
            }
        }
        Ok(program)
    }

    fn parse_declaration(&mut self, program: &mut Program) -> Result<(), ParseError> {
        let varargs = self.eat(Token::Varargs);

        let ty = match Parser::type_of(self.current()) {
            Some(ty) => {
                self.advance();
                ty
            }
            None => return Err(self.err("expected declaration")),
        };
        let array = self.eat(Token::Star);
        let name = self.ident()?;

        if self.current() == &Token::LParen {
            let fun = self.parse_function(ty, array, varargs, name)?;
            if program.function(&fun.name).is_some() {
                return Err(self.err(format!("duplicate function `{}`", fun.name)));
            }
            program.functions.push(Rc::new(fun));
            return Ok(());
        }

        if varargs {
            return Err(self.err("varargs only applies to functions"));
        }
        if ty == Type::Void {
            return Err(self.err("variables cannot be void"));
        }
        let init = if self.eat(Token::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(Token::Semi)?;
        if program.vars.iter().any(|v| v.name == name) {
            return Err(self.err(format!("duplicate variable `{}`", name)));
        }
        program.vars.push(VarDecl {
            ty,
            array,
            name,
            init,
        });
        Ok(())
    }

    fn parse_function(
        &mut self,
        ret: Type,
        ret_array: bool,
        varargs: bool,
        name: String,
    ) -> Result<FunctionDef, ParseError> {
        let line = self.line();
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if self.current() != &Token::RParen {
            loop {
                let ty = match Parser::type_of(self.current()) {
                    Some(Type::Void) => return Err(self.err("parameters cannot be void")),
                    Some(ty) => {
                        self.advance();
                        ty
                    }
                    None => return Err(self.err("expected parameter type")),
                };
                let array = self.eat(Token::Star);
                let pname = self.ident()?;
                if params.iter().any(|p: &Param| p.name == pname) {
                    return Err(self.err(format!("duplicate parameter `{}`", pname)));
                }
                params.push(Param {
                    ty,
                    array,
                    name: pname,
                });
                if !self.eat(Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;
        let body = self.parse_block()?;
        Ok(FunctionDef {
            name,
            ret,
            ret_array,
            varargs,
            params,
            body,
            line,
        })
    }

    // ---- statements ----

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.enter()?;
        self.expect(Token::LBrace)?;
        let mut stmts = Vec::new();
        while self.current() != &Token::RBrace {
            if self.current() == &Token::Eof {
                self.leave();
                return Err(self.err("unexpected EOF in block"));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.advance(); // }
        self.leave();
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        self.enter()?;
        let result = self.parse_stmt_inner();
        self.leave();
        result
    }

    fn parse_stmt_inner(&mut self) -> Result<Stmt, ParseError> {
        match self.current() {
            Token::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            Token::If => {
                self.advance();
                self.expect(Token::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(Token::RParen)?;
                let then = Box::new(self.parse_stmt()?);
                let els = if self.eat(Token::Else) {
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                Ok(Stmt::If { cond, then, els })
            }
            Token::While => {
                self.advance();
                self.expect(Token::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(Token::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::While { cond, body })
            }
            Token::For => {
                self.advance();
                self.expect(Token::LParen)?;
                let init = if self.eat(Token::Semi) {
                    None
                } else if Parser::type_of(self.current()).is_some() {
                    Some(Box::new(self.parse_local_decl()?))
                } else {
                    let e = self.parse_expr()?;
                    self.expect(Token::Semi)?;
                    Some(Box::new(Stmt::Expr(e)))
                };
                let cond = if self.current() == &Token::Semi {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(Token::Semi)?;
                let step = if self.current() == &Token::RParen {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(Token::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::For {
                    init,
                    cond,
                    step,
                    body,
                })
            }
            Token::Return => {
                self.advance();
                if self.eat(Token::Semi) {
                    Ok(Stmt::Return(None))
                } else {
                    let e = self.parse_expr()?;
                    self.expect(Token::Semi)?;
                    Ok(Stmt::Return(Some(e)))
                }
            }
            Token::Semi => {
                self.advance();
                Ok(Stmt::Block(Vec::new()))
            }
            tok if Parser::type_of(tok).is_some() => self.parse_local_decl(),
            _ => {
                let e = self.parse_expr()?;
                self.expect(Token::Semi)?;
                Ok(Stmt::Expr(e))
            }
        }
    }

    fn parse_local_decl(&mut self) -> Result<Stmt, ParseError> {
        let ty = match Parser::type_of(self.current()) {
            Some(Type::Void) => return Err(self.err("variables cannot be void")),
            Some(ty) => {
                self.advance();
                ty
            }
            None => return Err(self.err("expected type")),
        };
        let array = self.eat(Token::Star);
        let name = self.ident()?;
        let init = if self.eat(Token::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(Token::Semi)?;
        Ok(Stmt::Decl(VarDecl {
            ty,
            array,
            name,
            init,
        }))
    }

    // ---- expressions ----

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let result = self.parse_assignment();
        self.leave();
        result
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_or()?;
        let op = match self.current() {
            Token::Assign => AssignOp::Set,
            Token::PlusAssign => AssignOp::Add,
            Token::MinusAssign => AssignOp::Sub,
            _ => return Ok(lhs),
        };
        if !matches!(lhs, Expr::Ident(_) | Expr::Index { .. }) {
            return Err(self.err("invalid assignment target"));
        }
        self.advance();
        let value = self.parse_expr()?; // right-associative
        Ok(Expr::Assign {
            target: Box::new(lhs),
            op,
            value: Box::new(value),
        })
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.eat(Token::OrOr) {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_equality()?;
        while self.eat(Token::AndAnd) {
            let rhs = self.parse_equality()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.current() {
                Token::EqEq => BinOp::Eq,
                Token::NotEq => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.current() {
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.current() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.current() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let result = match self.current() {
            Token::Minus => {
                self.advance();
                // Fold negative literals directly
                if let Token::IntLit(n) = self.current().clone() {
                    self.advance();
                    Ok(Expr::IntLit(-n))
                } else {
                    Ok(Expr::Neg(Box::new(self.parse_unary()?)))
                }
            }
            Token::Bang => {
                self.advance();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        };
        self.leave();
        result
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current() {
                Token::LBracket => {
                    self.advance();
                    let first = self.parse_expr()?;
                    if self.eat(Token::DotDot) {
                        let hi = self.parse_expr()?;
                        self.expect(Token::RBracket)?;
                        expr = Expr::Slice {
                            base: Box::new(expr),
                            lo: Box::new(first),
                            hi: Box::new(hi),
                        };
                    } else {
                        self.expect(Token::RBracket)?;
                        expr = Expr::Index {
                            base: Box::new(expr),
                            index: Box::new(first),
                        };
                    }
                }
                Token::Arrow => {
                    let line = self.line();
                    self.advance();
                    let name = self.ident()?;
                    let args = self.parse_args()?;
                    expr = Expr::ArrowCall {
                        obj: Box::new(expr),
                        name,
                        args,
                        line,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.current() != &Token::RParen {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.current().clone() {
            Token::IntLit(n) => {
                self.advance();
                Ok(Expr::IntLit(n))
            }
            Token::StrLit(s) => {
                self.advance();
                Ok(Expr::StrLit(s))
            }
            Token::Ident(name) => {
                let line = self.line();
                self.advance();
                if self.current() == &Token::LParen {
                    let args = self.parse_args()?;
                    Ok(Expr::Call { name, args, line })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Token::ColonColon => {
                let line = self.line();
                self.advance();
                let name = self.ident()?;
                let args = self.parse_args()?;
                Ok(Expr::SuperCall { name, args, line })
            }
            Token::LParen => {
                self.advance();
                let e = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(e)
            }
            Token::ArrayOpen => {
                self.advance();
                let mut items = Vec::new();
                if self.current() != &Token::RBrace {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.eat(Token::Comma) {
                            break;
                        }
                        // trailing comma
                        if self.current() == &Token::RBrace {
                            break;
                        }
                    }
                }
                self.expect(Token::RBrace)?;
                self.expect(Token::RParen)?;
                Ok(Expr::ArrayLit(items))
            }
            Token::MapOpen => {
                self.advance();
                let mut pairs = Vec::new();
                if self.current() != &Token::RBracket {
                    loop {
                        let key = self.parse_expr()?;
                        self.expect(Token::Colon)?;
                        let value = self.parse_expr()?;
                        pairs.push((key, value));
                        if !self.eat(Token::Comma) {
                            break;
                        }
                        if self.current() == &Token::RBracket {
                            break;
                        }
                    }
                }
                self.expect(Token::RBracket)?;
                self.expect(Token::RParen)?;
                Ok(Expr::MapLit(pairs))
            }
            _ => Err(self.err("expected expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        parse_source(src).unwrap()
    }

    #[test]
    fn test_inherit_and_vars() {
        let prog = parse(
            r#"
            inherit "/std/object";
            int hp = 10;
            string* tags;
        "#,
        );
        assert_eq!(prog.inherit.as_deref(), Some("/std/object"));
        assert_eq!(prog.vars.len(), 2);
        assert!(prog.vars[1].array);
    }

    #[test]
    fn test_function_definition() {
        let prog = parse(
            r#"
            int add(int a, int b) { return a + b; }
        "#,
        );
        let f = prog.function("add").unwrap();
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.ret, Type::Int);
    }

    #[test]
    fn test_varargs_marker() {
        let prog = parse("varargs void greet(string who, string how) { }");
        assert!(prog.function("greet").unwrap().varargs);
    }

    #[test]
    fn test_precedence() {
        let prog = parse("int f() { return 1 + 2 * 3; }");
        let body = &prog.function("f").unwrap().body;
        match &body[0] {
            Stmt::Return(Some(Expr::Binary { op: BinOp::Add, right, .. })) => {
                assert!(matches!(**right, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_array_and_mapping_literals() {
        let prog = parse(r#"mixed f() { return ({ 1, "two", ({ 3 }) }); }"#);
        assert!(prog.function("f").is_some());
        let prog = parse(r#"mapping g() { return ([ "a": 1, 2: "b" ]); }"#);
        assert!(prog.function("g").is_some());
    }

    #[test]
    fn test_arrow_and_super_calls() {
        let prog = parse(
            r#"
            void create() { ::create(); this_object()->setup(); }
        "#,
        );
        let body = &prog.function("create").unwrap().body;
        assert!(matches!(body[0], Stmt::Expr(Expr::SuperCall { .. })));
        assert!(matches!(body[1], Stmt::Expr(Expr::ArrowCall { .. })));
    }

    #[test]
    fn test_slice_expression() {
        let prog = parse("mixed f(mixed a) { return a[1..2]; }");
        let body = &prog.function("f").unwrap().body;
        assert!(matches!(body[0], Stmt::Return(Some(Expr::Slice { .. }))));
    }

    #[test]
    fn test_for_loop_with_decl() {
        let prog = parse("int f() { int s; for (int i = 0; i < 10; i += 1) s += i; return s; }");
        assert!(prog.function("f").is_some());
    }

    #[test]
    fn test_index_inside_call_args() {
        // regression guard for the `])` lexing pitfall
        let prog = parse("int f(mixed a) { return sizeof(a[0]); }");
        assert!(prog.function("f").is_some());
    }

    #[test]
    fn test_assignment_target_validation() {
        assert!(parse_source("void f() { 1 + 2 = 3; }").is_err());
    }

    #[test]
    fn test_inherit_must_come_first() {
        assert!(parse_source("int x; inherit \"/std/object\";").is_err());
    }

    #[test]
    fn test_duplicate_function_rejected() {
        assert!(parse_source("void f() { } void f() { }").is_err());
    }

    #[test]
    fn test_error_carries_line() {
        let err = parse_source("void f() {\n  return ;;; +\n}").unwrap_err();
        assert!(err.line >= 2);
    }
}
