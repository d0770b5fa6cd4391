//! Recursive-descent parser with precedence climbing for expressions.
//!
//! A token cursor (`check`/`peek`/`advance`/`expect`), one `parse_*` method
//! per grammar production, and a standard precedence-climbing loop for
//! expressions. Parse errors accumulate in a `Vec<ParseError>` rather than
//! aborting on the first failure — recoverable via synchronization, counted,
//! surfaced at the end of the parse.

use crate::ast::*;
use crate::diagnostics::{NodeId, ParseError, SourceMap};
use crate::ident::{Identifier, Path};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::types::{BuiltinKind, Type};

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    map: &'a SourceMap,
    errors: Vec<ParseError>,
}

type PResult<T> = Result<T, ()>;

impl<'a> Parser<'a> {
    pub fn new(source: &str, map: &'a mut SourceMap) -> Result<Self, ParseError> {
        let lexer = Lexer::new(source, map);
        let tokens = lexer
            .tokenize()
            .map_err(|e| ParseError::new(map, 0, e.0))?;
        Ok(Parser {
            tokens,
            pos: 0,
            map,
            errors: Vec::new(),
        })
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn offset(&self) -> usize {
        self.map.span_of(self.current().node).map(|s| s.start).unwrap_or(0)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn at_eof(&self) -> bool {
        self.check(&TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            let offset = self.offset();
            self.errors.push(ParseError::new(
                self.map,
                offset,
                format!("expected {what}, found {:?}", self.current().kind),
            ));
            Err(())
        }
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let offset = self.offset();
        self.errors.push(ParseError::new(self.map, offset, message));
    }

    /// Skip tokens until a statement boundary (`;`) or a closing brace — the
    /// two synchronization points recoverable parse errors fall back to.
    fn synchronize(&mut self) {
        while !self.at_eof() {
            if self.check(&TokenKind::Semicolon) {
                self.advance();
                return;
            }
            if self.check(&TokenKind::RBrace) {
                return;
            }
            self.advance();
        }
    }

    fn intern_node(&mut self) -> NodeId {
        self.current().node
    }

    // ---------------------------------------------------------------
    // Top level
    // ---------------------------------------------------------------

    pub fn parse_program(&mut self) -> Result<Program, Vec<ParseError>> {
        let mut items = Vec::new();
        while !self.at_eof() {
            // A stray `}` left over from recovering inside a malformed
            // declaration has no enclosing block to consume it at top
            // level; skip it silently rather than reporting a second error
            // for the same underlying mistake.
            if self.check(&TokenKind::RBrace) {
                self.advance();
                continue;
            }
            match self.parse_top_level() {
                Ok(item) => items.push(item),
                Err(()) => self.synchronize(),
            }
        }
        if self.errors.is_empty() {
            Ok(Program { items })
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    fn parse_attributes(&mut self) -> Attributes {
        let mut attrs = Attributes::default();
        loop {
            if self.eat(&TokenKind::KwPublic) {
                attrs.public = true;
            } else if self.eat(&TokenKind::KwPrivate) {
                attrs.private = true;
            } else if self.eat(&TokenKind::KwExtern) {
                attrs.is_extern = true;
            } else if self.eat(&TokenKind::KwNomangle) {
                attrs.nomangle = true;
            } else {
                break;
            }
        }
        attrs
    }

    fn parse_top_level(&mut self) -> PResult<TopLevel> {
        let attrs = self.parse_attributes();
        if self.check(&TokenKind::KwNamespace) {
            return self.parse_namespace(attrs).map(TopLevel::Namespace);
        }
        if self.check(&TokenKind::KwClass) {
            return self.parse_class(attrs).map(TopLevel::Class);
        }
        if self.check(&TokenKind::KwUnion) {
            return self.parse_union(attrs).map(TopLevel::Union);
        }
        if self.check(&TokenKind::KwTypedef) {
            return self.parse_typedef().map(TopLevel::Typedef);
        }
        if self.check(&TokenKind::KwImport) {
            return self.parse_import().map(TopLevel::Import);
        }
        self.parse_function(attrs).map(TopLevel::Function)
    }

    fn parse_identifier(&mut self) -> PResult<Identifier> {
        let node_offset = self.offset();
        match self.current().kind.clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Identifier::new(name))
            }
            _ => {
                self.errors.push(ParseError::new(self.map, node_offset, "expected identifier"));
                Err(())
            }
        }
    }

    fn parse_namespace(&mut self, _attrs: Attributes) -> PResult<NamespaceDef> {
        let node = self.intern_node();
        self.expect(TokenKind::KwNamespace, "'namespace'")?;
        let name = self.parse_identifier()?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            match self.parse_top_level() {
                Ok(item) => items.push(item),
                Err(()) => self.synchronize(),
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(NamespaceDef { name, items, node })
    }

    fn parse_template_params(&mut self) -> PResult<Vec<Identifier>> {
        let mut params = Vec::new();
        if self.eat(&TokenKind::Lt) {
            loop {
                params.push(self.parse_identifier()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Gt, "'>'")?;
        }
        Ok(params)
    }

    fn parse_type(&mut self) -> PResult<Type> {
        let mut base = if self.eat(&TokenKind::KwVoid) {
            Type::void()
        } else {
            let name = self.parse_identifier()?;
            match name.as_utf8().as_str() {
                "bool" => Type::bool(),
                "i8" => Type::Builtin(BuiltinKind::I8),
                "u8" => Type::Builtin(BuiltinKind::U8),
                "i16" => Type::Builtin(BuiltinKind::I16),
                "u16" => Type::Builtin(BuiltinKind::U16),
                "i32" => Type::i32(),
                "u32" => Type::Builtin(BuiltinKind::U32),
                "i64" => Type::Builtin(BuiltinKind::I64),
                "u64" => Type::Builtin(BuiltinKind::U64),
                "f32" => Type::Builtin(BuiltinKind::F32),
                "f64" => Type::Builtin(BuiltinKind::F64),
                "char" => Type::Builtin(BuiltinKind::Char),
                _ => {
                    if self.eat(&TokenKind::Lt) {
                        let mut args = Vec::new();
                        loop {
                            args.push(self.parse_type()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                        self.expect(TokenKind::Gt, "'>'")?;
                        Type::UserDefinedTemplate { base: name, args }
                    } else {
                        Type::UserDefined(name)
                    }
                }
            }
        };
        while self.eat(&TokenKind::Ampersand) {
            base = Type::Reference(Box::new(base));
        }
        let mut depth = 0u32;
        while self.eat(&TokenKind::Star) {
            depth += 1;
        }
        if depth > 0 {
            base = base.pointer_to(depth);
        }
        if self.eat(&TokenKind::LBracket) {
            let size = self.parse_int_literal_value()?;
            self.expect(TokenKind::RBracket, "']'")?;
            base = Type::Array {
                element: Box::new(base),
                size: size as u64,
            };
        }
        Ok(base)
    }

    fn parse_int_literal_value(&mut self) -> PResult<i64> {
        match self.current().kind.clone() {
            TokenKind::IntLiteral(v) => {
                self.advance();
                Ok(v)
            }
            _ => {
                self.error_here("expected integer literal");
                Err(())
            }
        }
    }

    fn parse_params(&mut self) -> PResult<Vec<Param>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let name = self.parse_identifier()?;
                if name.as_utf8() == "self" {
                    self.error_here("'self' is an implicit receiver and cannot be declared as a parameter");
                    return Err(());
                }
                self.expect(TokenKind::Colon, "':'")?;
                let ty = self.parse_type()?;
                params.push(Param { name, ty });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(params)
    }

    fn parse_function(&mut self, attributes: Attributes) -> PResult<FunctionDef> {
        let node = self.intern_node();
        let name = self.parse_identifier()?;
        let template_params = self.parse_template_params()?;
        let params = self.parse_params()?;
        let return_type = if self.eat(&TokenKind::Arrow) {
            self.parse_type()?
        } else {
            Type::void()
        };
        let body = if self.eat(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_block()?)
        };
        Ok(FunctionDef {
            name,
            template_params,
            params,
            return_type,
            body,
            attributes,
            node,
        })
    }

    fn parse_class(&mut self, attributes: Attributes) -> PResult<ClassDef> {
        let node = self.intern_node();
        self.expect(TokenKind::KwClass, "'class'")?;
        let name = self.parse_identifier()?;
        let template_params = self.parse_template_params()?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let field_attrs = self.parse_attributes();
            let name = match self.parse_identifier() {
                Ok(n) => n,
                Err(()) => {
                    self.synchronize();
                    continue;
                }
            };
            if self.check(&TokenKind::LParen) || self.check(&TokenKind::Lt) {
                // method: reuse parse_function's tail starting after name
                let template_params = match self.parse_template_params() {
                    Ok(t) => t,
                    Err(()) => {
                        self.synchronize();
                        continue;
                    }
                };
                let params = match self.parse_params() {
                    Ok(p) => p,
                    Err(()) => {
                        self.synchronize();
                        continue;
                    }
                };
                let return_type = if self.eat(&TokenKind::Arrow) {
                    match self.parse_type() {
                        Ok(t) => t,
                        Err(()) => {
                            self.synchronize();
                            continue;
                        }
                    }
                } else {
                    Type::void()
                };
                let body = if self.eat(&TokenKind::Semicolon) {
                    None
                } else {
                    match self.parse_block() {
                        Ok(b) => Some(b),
                        Err(()) => {
                            self.synchronize();
                            continue;
                        }
                    }
                };
                methods.push(FunctionDef {
                    name,
                    template_params,
                    params,
                    return_type,
                    body,
                    attributes: field_attrs,
                    node,
                });
            } else {
                if self.expect(TokenKind::Colon, "':'").is_err() {
                    self.synchronize();
                    continue;
                }
                let ty = match self.parse_type() {
                    Ok(t) => t,
                    Err(()) => {
                        self.synchronize();
                        continue;
                    }
                };
                let _ = self.expect(TokenKind::Semicolon, "';'");
                fields.push(FieldDef {
                    name,
                    ty,
                    attributes: field_attrs,
                });
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(ClassDef {
            name,
            template_params,
            fields,
            methods,
            attributes,
            node,
        })
    }

    fn parse_union(&mut self, attributes: Attributes) -> PResult<UnionDef> {
        let node = self.intern_node();
        self.expect(TokenKind::KwUnion, "'union'")?;
        let name = self.parse_identifier()?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut variants = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let vname = self.parse_identifier()?;
            let mut fields = Vec::new();
            if self.eat(&TokenKind::LBrace) {
                while !self.check(&TokenKind::RBrace) && !self.at_eof() {
                    let fname = self.parse_identifier()?;
                    self.expect(TokenKind::Colon, "':'")?;
                    let ty = self.parse_type()?;
                    fields.push(FieldDef {
                        name: fname,
                        ty,
                        attributes: Attributes::default(),
                    });
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace, "'}'")?;
            }
            variants.push(UnionVariant { name: vname, fields });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(UnionDef {
            name,
            variants,
            attributes,
            node,
        })
    }

    fn parse_typedef(&mut self) -> PResult<TypedefDef> {
        let node = self.intern_node();
        self.expect(TokenKind::KwTypedef, "'typedef'")?;
        let name = self.parse_identifier()?;
        self.expect(TokenKind::Eq, "'='")?;
        let target = self.parse_type()?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(TypedefDef { name, target, node })
    }

    fn parse_import(&mut self) -> PResult<ImportDef> {
        let node = self.intern_node();
        self.expect(TokenKind::KwImport, "'import'")?;
        let mut text = self.parse_identifier()?.as_utf8();
        while self.eat(&TokenKind::ColonColon) {
            text.push_str("::");
            text.push_str(&self.parse_identifier()?.as_utf8());
        }
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(ImportDef {
            path: Path::new(text),
            node,
        })
    }

    // ---------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------

    fn parse_block(&mut self) -> PResult<Vec<Statement>> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            match self.parse_statement() {
                Ok(s) => stmts.push(s),
                Err(()) => self.synchronize(),
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> PResult<Statement> {
        let node = self.intern_node();
        if self.check(&TokenKind::KwReturn) {
            self.advance();
            let value = if self.check(&TokenKind::Semicolon) {
                None
            } else {
                Some(self.parse_expression()?)
            };
            self.expect(TokenKind::Semicolon, "';'")?;
            return Ok(Statement::Return { value, node });
        }
        if self.check(&TokenKind::KwIf) {
            return self.parse_if();
        }
        if self.check(&TokenKind::KwWhile) {
            return self.parse_while();
        }
        if self.check(&TokenKind::KwFor) {
            return self.parse_for();
        }
        if self.check(&TokenKind::KwLoop) {
            self.advance();
            let body = self.parse_block()?;
            return Ok(Statement::Loop { body, node });
        }
        if self.check(&TokenKind::KwMatch) {
            return self.parse_match();
        }
        if self.check(&TokenKind::KwBreak) {
            self.advance();
            self.expect(TokenKind::Semicolon, "';'")?;
            return Ok(Statement::Break(node));
        }
        if self.check(&TokenKind::KwContinue) {
            self.advance();
            self.expect(TokenKind::Semicolon, "';'")?;
            return Ok(Statement::Continue(node));
        }
        if self.check(&TokenKind::LBrace) {
            let body = self.parse_block()?;
            return Ok(Statement::Block { body, node });
        }
        if self.looks_like_var_def() {
            return self.parse_var_def().map(Statement::VarDef);
        }
        let expr = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Statement::Expr(expr))
    }

    /// A var-def begins with the `let`/`var` keyword, distinguishing it
    /// from a bare expression statement by a one-token lookahead — variable
    /// declarations are statement-level, not expressions.
    fn looks_like_var_def(&self) -> bool {
        if let TokenKind::Identifier(name) = &self.current().kind {
            if name == "let" || name == "var" {
                return true;
            }
        }
        false
    }

    fn parse_var_def(&mut self) -> PResult<VarDef> {
        let node = self.intern_node();
        let keyword = self.parse_identifier()?;
        let mutable = keyword.as_utf8() == "var";
        let name = self.parse_identifier()?;
        let declared_type = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let initializer = if self.eat(&TokenKind::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(VarDef {
            name,
            declared_type,
            initializer,
            mutable,
            node,
        })
    }

    fn parse_if(&mut self) -> PResult<Statement> {
        let node = self.intern_node();
        self.expect(TokenKind::KwIf, "'if'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')'")?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.eat(&TokenKind::KwElse) {
            if self.check(&TokenKind::KwIf) {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Statement::If {
            condition,
            then_branch,
            else_branch,
            node,
        })
    }

    fn parse_while(&mut self) -> PResult<Statement> {
        let node = self.intern_node();
        self.expect(TokenKind::KwWhile, "'while'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_block()?;
        Ok(Statement::While { condition, body, node })
    }

    fn parse_for(&mut self) -> PResult<Statement> {
        let node = self.intern_node();
        self.expect(TokenKind::KwFor, "'for'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let init = if self.check(&TokenKind::Semicolon) {
            self.advance();
            None
        } else if self.looks_like_var_def() {
            let v = self.parse_var_def()?;
            Some(Box::new(Statement::VarDef(v)))
        } else {
            let e = self.parse_expression()?;
            self.expect(TokenKind::Semicolon, "';'")?;
            Some(Box::new(Statement::Expr(e)))
        };
        let condition = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon, "';'")?;
        let step = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(Box::new(Statement::Expr(self.parse_expression()?)))
        };
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_block()?;
        Ok(Statement::For {
            init,
            condition,
            step,
            body,
            node,
        })
    }

    fn parse_match(&mut self) -> PResult<Statement> {
        let node = self.intern_node();
        self.expect(TokenKind::KwMatch, "'match'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let scrutinee = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut arms = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let arm_node = self.intern_node();
            let pattern = if let TokenKind::Identifier(name) = self.current().kind.clone() {
                if name == "_" {
                    self.advance();
                    Pattern::Wildcard
                } else {
                    self.advance();
                    let mut bindings = Vec::new();
                    if self.eat(&TokenKind::LBrace) {
                        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
                            bindings.push(self.parse_identifier()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                        self.expect(TokenKind::RBrace, "'}'")?;
                    }
                    Pattern::Variant {
                        name: Identifier::new(name),
                        bindings,
                    }
                }
            } else {
                self.error_here("expected match pattern");
                return Err(());
            };
            self.expect(TokenKind::Arrow, "'->'")?;
            let body = if self.check(&TokenKind::LBrace) {
                self.parse_block()?
            } else {
                let e = self.parse_expression()?;
                vec![Statement::Expr(e)]
            };
            let _ = self.eat(&TokenKind::Comma);
            arms.push(MatchArm {
                pattern,
                body,
                node: arm_node,
            });
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Statement::Match {
            scrutinee,
            arms,
            node,
        })
    }

    // ---------------------------------------------------------------
    // Expressions: precedence climbing.1's table, lowest
    // (logical or) to highest (unary/postfix).
    // ---------------------------------------------------------------

    fn parse_expression(&mut self) -> PResult<Expression> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<Expression> {
        let node = self.intern_node();
        let lhs = self.parse_binary(0)?;
        if self.eat(&TokenKind::Eq) {
            let value = Box::new(self.parse_assignment()?);
            return Ok(Expression::Assign {
                target: Box::new(lhs),
                value,
                node,
            });
        }
        let compound = match self.current().kind {
            TokenKind::PlusEq => Some(CompoundAssignOp::Add),
            TokenKind::MinusEq => Some(CompoundAssignOp::Sub),
            TokenKind::StarEq => Some(CompoundAssignOp::Mul),
            TokenKind::SlashEq => Some(CompoundAssignOp::Div),
            _ => None,
        };
        if let Some(op) = compound {
            self.advance();
            let value = Box::new(self.parse_assignment()?);
            return Ok(Expression::CompoundAssign {
                op,
                target: Box::new(lhs),
                value,
                node,
            });
        }
        Ok(lhs)
    }

    /// Binding power table, low to high.
    fn binop_for(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
        use BinaryOp::*;
        Some(match kind {
            TokenKind::OrOr => (Or, 1),
            TokenKind::AndAnd => (And, 2),
            TokenKind::EqEq => (Eq, 3),
            TokenKind::Ne => (Ne, 3),
            TokenKind::Lt => (Lt, 4),
            TokenKind::Gt => (Gt, 4),
            TokenKind::Le => (Le, 4),
            TokenKind::Ge => (Ge, 4),
            TokenKind::Pipe => (BitOr, 5),
            TokenKind::Caret => (BitXor, 6),
            TokenKind::Ampersand => (BitAnd, 7),
            TokenKind::Shl => (Shl, 8),
            TokenKind::Shr => (Shr, 8),
            TokenKind::Plus => (Add, 9),
            TokenKind::Minus => (Sub, 9),
            TokenKind::Star => (Mul, 10),
            TokenKind::Slash => (Div, 10),
            TokenKind::Percent => (Rem, 10),
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_bp: u8) -> PResult<Expression> {
        let node = self.intern_node();
        let mut lhs = self.parse_unary()?;
        while let Some((op, bp)) = Self::binop_for(&self.current().kind) {
            if bp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_binary(bp + 1)?;
            lhs = Expression::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                node,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expression> {
        let node = self.intern_node();
        let op = match self.current().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Ampersand => Some(UnaryOp::AddressOf),
            TokenKind::Star => Some(UnaryOp::Deref),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = Box::new(self.parse_unary()?);
            return Ok(Expression::Unary { op, operand, node });
        }
        if self.check(&TokenKind::PlusPlus) || self.check(&TokenKind::MinusMinus) {
            let op = if self.check(&TokenKind::PlusPlus) {
                IncDecOp::Increment
            } else {
                IncDecOp::Decrement
            };
            self.advance();
            let target = Box::new(self.parse_unary()?);
            return Ok(Expression::IncDec { op, target, node });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expression> {
        let mut expr = self.parse_postfix_chain()?;
        // `a |> f` desugars to `f(a)`; `a |> f(args)` to `f(a, args)` — no
        // dedicated AST node, just argument-list surgery at parse time.
        // Left-associative: each step parses only one non-pipeline chain
        // for its right-hand side, so `a |> f |> g` groups as `g(f(a))`
        // rather than recursing through this same loop again.
        while self.check(&TokenKind::PipeArrow) {
            let node = self.intern_node();
            self.advance();
            let rhs = self.parse_postfix_chain()?;
            expr = match rhs {
                Expression::Call {
                    callee,
                    mut args,
                    node: call_node,
                } => {
                    args.insert(0, expr);
                    Expression::Call {
                        callee,
                        args,
                        node: call_node,
                    }
                }
                other => Expression::Call {
                    callee: Box::new(other),
                    args: vec![expr],
                    node,
                },
            };
        }
        Ok(expr)
    }

    /// Primary + postfix suffixes (`.field`, `[index]`, `(args)`) + `as`
    /// cast, stopping short of `|>` so [`parse_postfix`]'s pipeline loop
    /// can stay left-associative instead of this chain swallowing the
    /// next pipeline stage too.
    fn parse_postfix_chain(&mut self) -> PResult<Expression> {
        let mut expr = self.parse_primary()?;
        loop {
            let node = self.intern_node();
            if self.eat(&TokenKind::Dot) {
                let member = self.parse_identifier()?;
                expr = Expression::MemberAccess {
                    object: Box::new(expr),
                    member,
                    node,
                };
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_expression()?;
                self.expect(TokenKind::RBracket, "']'")?;
                expr = Expression::ArrayIndex {
                    array: Box::new(expr),
                    index: Box::new(index),
                    node,
                };
            } else if self.check(&TokenKind::LParen) {
                let args = self.parse_call_args()?;
                expr = Expression::Call {
                    callee: Box::new(expr),
                    args,
                    node,
                };
            } else {
                break;
            }
        }
        // `as` cast has lower binding than postfix but higher than
        // comparison; handled here as a suffix to keep the climber flat.
        if let TokenKind::Identifier(kw) = &self.current().kind {
            if kw == "as" {
                let node = self.intern_node();
                self.advance();
                let target_type = self.parse_type()?;
                expr = Expression::Cast {
                    target_type,
                    operand: Box::new(expr),
                    node,
                };
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> PResult<Vec<Expression>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Expression> {
        let node = self.intern_node();
        match self.current().kind.clone() {
            TokenKind::IntLiteral(v) => {
                self.advance();
                Ok(Expression::IntLiteral { value: v, node })
            }
            TokenKind::FloatLiteral(v) => {
                self.advance();
                Ok(Expression::FloatLiteral { value: v, node })
            }
            TokenKind::KwTrue => {
                self.advance();
                Ok(Expression::BoolLiteral { value: true, node })
            }
            TokenKind::KwFalse => {
                self.advance();
                Ok(Expression::BoolLiteral { value: false, node })
            }
            TokenKind::StringLiteral(s) => {
                self.advance();
                Ok(Expression::StringLiteral { value: s, node })
            }
            TokenKind::CharLiteral(c) => {
                self.advance();
                Ok(Expression::CharLiteral { value: c, node })
            }
            TokenKind::KwNew => {
                self.advance();
                let ty = self.parse_type()?;
                let args = if self.check(&TokenKind::LParen) {
                    self.parse_call_args()?
                } else {
                    Vec::new()
                };
                Ok(Expression::New { ty, args, node })
            }
            TokenKind::KwDelete => {
                self.advance();
                let operand = Box::new(self.parse_unary()?);
                Ok(Expression::Delete { operand, node })
            }
            TokenKind::KwNull => {
                self.advance();
                Ok(Expression::Null { node })
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    loop {
                        elements.push(self.parse_expression()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket, "']'")?;
                Ok(Expression::ArrayLiteral { elements, node })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Expression::Grouping {
                    inner: Box::new(inner),
                    node,
                })
            }
            TokenKind::Identifier(name) => {
                if name == "sizeof" {
                    self.advance();
                    self.expect(TokenKind::LParen, "'('")?;
                    let ty = self.parse_type()?;
                    self.expect(TokenKind::RParen, "')'")?;
                    return Ok(Expression::Sizeof { ty, node });
                }
                self.advance();
                if self.check(&TokenKind::ColonColon) {
                    let mut text = name.clone();
                    while self.eat(&TokenKind::ColonColon) {
                        text.push_str("::");
                        text.push_str(&self.parse_identifier()?.as_utf8());
                    }
                    return Ok(Expression::ScopeResolution {
                        path: Path::new(text),
                        node,
                    });
                }
                if self.check(&TokenKind::Lt) && self.looks_like_template_call() {
                    self.advance();
                    let mut template_args = Vec::new();
                    loop {
                        template_args.push(self.parse_type()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::Gt, "'>'")?;
                    let args = self.parse_call_args()?;
                    return Ok(Expression::TemplateCall {
                        callee: Box::new(Expression::NameRef {
                            name: Identifier::new(name),
                            node,
                        }),
                        template_args,
                        args,
                        node,
                    });
                }
                Ok(Expression::NameRef {
                    name: Identifier::new(name),
                    node,
                })
            }
            other => {
                self.errors.push(ParseError::new(
                    self.map,
                    self.offset(),
                    format!("unexpected token in expression: {other:?}"),
                ));
                Err(())
            }
        }
    }

    /// Disambiguate `id<T>(...)` (a template call) from `id < a` (a
    /// comparison) by a short bounded lookahead — a common ambiguity in
    /// angle-bracket-generic grammars.
    fn looks_like_template_call(&self) -> bool {
        let mut depth = 0i32;
        let mut i = self.pos;
        loop {
            match self.tokens.get(i).map(|t| &t.kind) {
                Some(TokenKind::Lt) => depth += 1,
                Some(TokenKind::Gt) => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(self.tokens.get(i + 1).map(|t| &t.kind), Some(TokenKind::LParen));
                    }
                }
                Some(TokenKind::Identifier(_))
                | Some(TokenKind::Comma)
                | Some(TokenKind::Star)
                | Some(TokenKind::Ampersand) => {}
                _ => return false,
            }
            i += 1;
            if i - self.pos > 32 {
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(src: &str) -> Result<Program, Vec<ParseError>> {
        let mut map = SourceMap::new(PathBuf::from("t.em"), src.to_string());
        let mut parser = Parser::new(src, &mut map).unwrap();
        parser.parse_program()
    }

    #[test]
    fn parses_minimal_main_function() {
        let program = parse("main() -> i32 { return 42; }").unwrap();
        assert_eq!(program.items.len(), 1);
        match &program.items[0] {
            TopLevel::Function(f) => {
                assert_eq!(f.name.as_utf8(), "main");
            }
            _ => panic!("expected function"),
        }
    }

    #[test]
    fn parses_binary_precedence() {
        let program = parse("f() -> i32 { return 1 + 2 * 3; }").unwrap();
        let TopLevel::Function(f) = &program.items[0] else {
            panic!()
        };
        let Statement::Return { value: Some(expr), .. } = &f.body.as_ref().unwrap()[0] else {
            panic!()
        };
        assert_eq!(print_expression(expr), "(1 + (2 * 3))");
    }

    #[test]
    fn parses_class_with_field_and_method() {
        let program = parse(
            "class Point { x: i32; y: i32; len() -> i32 { return self.x; } }",
        )
        .unwrap();
        let TopLevel::Class(c) = &program.items[0] else {
            panic!()
        };
        assert_eq!(c.fields.len(), 2);
        assert_eq!(c.methods.len(), 1);
    }

    #[test]
    fn rejects_explicit_self_parameter() {
        let errs = parse("class Point { len(self: Point) -> i32 { return 0; } }").unwrap_err();
        assert!(!errs.is_empty());
    }

    #[test]
    fn pipeline_desugars_left_associatively() {
        let program = parse("f() -> i32 { return 1 |> g |> h; }").unwrap();
        let TopLevel::Function(f) = &program.items[0] else {
            panic!()
        };
        let Statement::Return { value: Some(expr), .. } = &f.body.as_ref().unwrap()[0] else {
            panic!()
        };
        match expr {
            Expression::Call { callee, args, .. } => {
                let Expression::NameRef { name, .. } = callee.as_ref() else {
                    panic!("expected outer callee to be 'h'")
                };
                assert_eq!(name.as_utf8(), "h");
                assert_eq!(args.len(), 1);
                match &args[0] {
                    Expression::Call { callee, args, .. } => {
                        let Expression::NameRef { name, .. } = callee.as_ref() else {
                            panic!("expected inner callee to be 'g'")
                        };
                        assert_eq!(name.as_utf8(), "g");
                        assert_eq!(args.len(), 1);
                    }
                    other => panic!("expected nested call, got {other:?}"),
                }
            }
            other => panic!("expected a call, got {other:?}"),
        }
    }

    #[test]
    fn parses_null_and_array_literals() {
        let program = parse("f() -> i32 { var p: i32* = null; var xs: i32[3] = [1, 2, 3]; return 0; }").unwrap();
        let TopLevel::Function(f) = &program.items[0] else {
            panic!()
        };
        let body = f.body.as_ref().unwrap();
        let Statement::VarDef(p) = &body[0] else { panic!() };
        assert!(matches!(p.initializer, Some(Expression::Null { .. })));
        let Statement::VarDef(xs) = &body[1] else { panic!() };
        match &xs.initializer {
            Some(Expression::ArrayLiteral { elements, .. }) => assert_eq!(elements.len(), 3),
            other => panic!("expected array literal, got {other:?}"),
        }
    }

    #[test]
    fn reports_two_errors_and_fails_on_malformed_input() {
        let errs = parse("f( { return; } g( { return; }").unwrap_err();
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn parses_for_loop_counting_to_ten() {
        let program = parse(
            "main() -> i32 { for (var i: i32 = 0; i < 10; i += 1) { } return 0; }",
        )
        .unwrap();
        let TopLevel::Function(f) = &program.items[0] else {
            panic!()
        };
        assert!(matches!(f.body.as_ref().unwrap()[0], Statement::For { .. }));
    }

    #[test]
    fn parses_template_call() {
        let program = parse("f() -> i32 { return id<i32>(1); }").unwrap();
        let TopLevel::Function(f) = &program.items[0] else {
            panic!()
        };
        let Statement::Return { value: Some(expr), .. } = &f.body.as_ref().unwrap()[0] else {
            panic!()
        };
        assert!(matches!(expr, Expression::TemplateCall { .. }));
    }
}
