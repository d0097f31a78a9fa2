pub mod parser;

pub use parser::Parser;

#[cfg(test)]
mod tests {
    use super::*;
    use tern_lexer::Scanner;
    use tern_syntax::ast::*;
    use tern_syntax::token::TokenKind;
    use tern_syntax::types::Type;

    fn parse_expr_str(input: &str) -> Expr {
        let tokens = Scanner::new(input).scan().expect("scan should succeed");
        Parser::new(tokens).parse_expr().expect("parse should succeed")
    }

    fn parse_program_str(input: &str) -> Program {
        let tokens = Scanner::new(input).scan().expect("scan should succeed");
        Parser::new(tokens)
            .parse_program()
            .expect("parse should succeed")
    }

    fn parse_program_err(input: &str) -> String {
        let tokens = Scanner::new(input).scan().expect("scan should succeed");
        Parser::new(tokens).parse_program().unwrap_err().msg
    }

    #[test]
    fn literal_expressions() {
        assert!(matches!(parse_expr_str("42"), Expr::Int(IntLit { value: 42, .. })));
        assert!(matches!(parse_expr_str("-7"), Expr::Int(IntLit { value: -7, .. })));
        assert!(matches!(parse_expr_str("true"), Expr::Bool(BoolLit { value: true, .. })));
        assert!(
            matches!(parse_expr_str("\"hi\\n\""), Expr::Str(StringLit { value, .. }) if value == "hi\n")
        );
    }

    #[test]
    fn unknown_escape_is_rejected() {
        let tokens = Scanner::new("\"\\q\"").scan().unwrap();
        let err = Parser::new(tokens).parse_expr().unwrap_err();
        assert!(err.msg.contains("Unknown escape sequence"));
    }

    #[test]
    fn operator_precedence() {
        // 1 + 2 * 3 groups the product under the sum.
        let expr = parse_expr_str("1 + 2 * 3");
        let Expr::Infix(add) = expr else { panic!("expected infix") };
        assert_eq!(add.op, TokenKind::Plus);
        assert!(matches!(*add.right, Expr::Infix(InfixExpr { op: TokenKind::Star, .. })));

        // Comparison binds looser than arithmetic, logic looser still.
        let expr = parse_expr_str("a + 1 < b && c");
        let Expr::Infix(and) = expr else { panic!("expected infix") };
        assert_eq!(and.op, TokenKind::AndAnd);
        assert!(matches!(*and.left, Expr::Infix(InfixExpr { op: TokenKind::Lt, .. })));
    }

    #[test]
    fn in_binds_tighter_than_comparison() {
        let expr = parse_expr_str("x in 0..9 == found");
        let Expr::Infix(eq) = expr else { panic!("expected infix") };
        assert_eq!(eq.op, TokenKind::Eq);
        assert!(matches!(*eq.left, Expr::Infix(InfixExpr { op: TokenKind::In, .. })));
    }

    #[test]
    fn range_literal() {
        let expr = parse_expr_str("1..n");
        let Expr::Range(range) = expr else { panic!("expected range") };
        assert!(matches!(*range.lower, Expr::Int(_)));
        assert!(matches!(*range.upper, Expr::Ident(_)));
    }

    #[test]
    fn grouped_vs_function_literal() {
        assert!(matches!(parse_expr_str("(1 + 2)"), Expr::Infix(_)));
        assert!(matches!(parse_expr_str("() -> { }"), Expr::Func(_)));
        let expr = parse_expr_str("(x: int) -> int { return x; }");
        let Expr::Func(lit) = expr else { panic!("expected func lit") };
        assert_eq!(lit.params.len(), 1);
        assert_eq!(lit.params[0].name, "x");
        assert_eq!(lit.ret, Some(Type::Int));
    }

    #[test]
    fn array_literal_vs_short_form() {
        let Expr::Array(arr) = parse_expr_str("[1, 2, 3]") else { panic!("expected array") };
        assert_eq!(arr.elems.len(), 3);

        let Expr::ArrayShort(short) = parse_expr_str("[4]int(0)") else {
            panic!("expected short form")
        };
        assert_eq!(short.len, 4);
        assert_eq!(short.elem_ty, Type::Int);
        assert!(short.value.is_some());

        let Expr::ArrayShort(short) = parse_expr_str("[0]bool()") else {
            panic!("expected short form")
        };
        assert_eq!(short.len, 0);
        assert!(short.value.is_none());
    }

    #[test]
    fn empty_array_literal_is_rejected() {
        let tokens = Scanner::new("[]").scan().unwrap();
        let err = Parser::new(tokens).parse_expr().unwrap_err();
        assert!(err.msg.contains("Empty array literal"));
    }

    #[test]
    fn calls_and_lib_calls() {
        let Expr::Call(call) = parse_expr_str("add(1, 2)") else { panic!("expected call") };
        assert_eq!(call.args.len(), 2);
        assert!(matches!(*call.callee, Expr::Ident(_)));

        let Expr::LibCall(lib) = parse_expr_str("printf(\"%d\\n\", 5)") else {
            panic!("expected lib call")
        };
        assert_eq!(lib.name, "printf");
        assert_eq!(lib.args.len(), 2);
    }

    #[test]
    fn index_expression() {
        let Expr::Index(idx) = parse_expr_str("a[i + 1]") else { panic!("expected index") };
        assert!(matches!(*idx.base, Expr::Ident(_)));
        assert!(matches!(*idx.index, Expr::Infix(_)));
    }

    #[test]
    fn var_statement_with_multiple_decls() {
        let prog = parse_program_str("var a := 1, b: bool = true;");
        let Stmt::Var(var) = &prog.stmts[0] else { panic!("expected var") };
        assert_eq!(var.decls.len(), 2);
        assert_eq!(var.decls[0].name, "a");
        assert!(var.decls[0].ty.is_none());
        assert_eq!(var.decls[1].ty, Some(Type::Bool));
    }

    #[test]
    fn var_requires_initializer() {
        assert!(parse_program_err("var a: int;").contains("no initial value"));
    }

    #[test]
    fn func_declaration() {
        let prog = parse_program_str("func add(x: int, y: int) -> int { return x + y; }");
        let Stmt::Func(decl) = &prog.stmts[0] else { panic!("expected func") };
        assert_eq!(decl.name, "add");
        assert_eq!(decl.params.len(), 2);
        assert_eq!(decl.ret, Some(Type::Int));

        // Void form carries the arrow with no type.
        let prog = parse_program_str("func noop() -> { }");
        let Stmt::Func(decl) = &prog.stmts[0] else { panic!("expected func") };
        assert!(decl.ret.is_none());
    }

    #[test]
    fn param_annotations_are_mandatory() {
        assert!(parse_program_err("func f(x) -> { }").contains("must be annotated"));
    }

    #[test]
    fn for_statement_with_and_without_index() {
        let prog = parse_program_str("for e in 0..3 { }");
        let Stmt::For(f) = &prog.stmts[0] else { panic!("expected for") };
        assert_eq!(f.elem.name, "e");
        assert!(f.index.name.is_empty());

        let prog = parse_program_str("for e, i in xs { }");
        let Stmt::For(f) = &prog.stmts[0] else { panic!("expected for") };
        assert_eq!(f.index.name, "i");
        assert!(matches!(f.iter.value, Some(Expr::Ident(_))));
    }

    #[test]
    fn if_else_chains() {
        let prog = parse_program_str("if a { } else if b { } else { }");
        let Stmt::If(stmt) = &prog.stmts[0] else { panic!("expected if") };
        let Some(alt) = &stmt.alt else { panic!("expected else") };
        assert!(matches!(**alt, Stmt::If(_)));
    }

    #[test]
    fn assignment_forms() {
        let prog = parse_program_str("x = 1; a[0] += 2;");
        let Stmt::Assign(a) = &prog.stmts[0] else { panic!("expected assign") };
        assert_eq!(a.op, TokenKind::Assign);
        let Stmt::Assign(b) = &prog.stmts[1] else { panic!("expected assign") };
        assert_eq!(b.op, TokenKind::AddAssign);
        assert!(matches!(b.target, Expr::Index(_)));
    }

    #[test]
    fn invalid_assignment_target() {
        assert!(parse_program_err("1 + 2 = 3;").contains("Invalid target"));
    }

    #[test]
    fn type_syntax() {
        let prog = parse_program_str("var a: [3]int = [1, 2, 3];");
        let Stmt::Var(var) = &prog.stmts[0] else { panic!("expected var") };
        assert_eq!(
            var.decls[0].ty,
            Some(Type::Array {
                len: 3,
                elem: Box::new(Type::Int)
            })
        );

        let prog = parse_program_str("var f: (int) -> int = (x: int) -> int { return x; };");
        let Stmt::Var(var) = &prog.stmts[0] else { panic!("expected var") };
        assert_eq!(
            var.decls[0].ty,
            Some(Type::Func {
                params: vec![Type::Int],
                ret: Some(Box::new(Type::Int))
            })
        );

        // Void function type is spelled `-> {}`.
        let prog = parse_program_str("var f: (int) -> {} = g;");
        let Stmt::Var(var) = &prog.stmts[0] else { panic!("expected var") };
        assert_eq!(
            var.decls[0].ty,
            Some(Type::Func {
                params: vec![Type::Int],
                ret: None
            })
        );
    }

    #[test]
    fn node_ids_are_unique() {
        let prog = parse_program_str("var a := 1; a = a + 1;");
        let mut ids = Vec::new();
        fn walk_expr(e: &Expr, ids: &mut Vec<NodeId>) {
            ids.push(e.id());
            match e {
                Expr::Infix(i) => {
                    walk_expr(&i.left, ids);
                    walk_expr(&i.right, ids);
                }
                Expr::Prefix(p) => walk_expr(&p.right, ids),
                _ => {}
            }
        }
        for stmt in &prog.stmts {
            match stmt {
                Stmt::Var(v) => {
                    for d in &v.decls {
                        ids.push(d.id);
                        if let Some(val) = &d.value {
                            walk_expr(val, &mut ids);
                        }
                    }
                }
                Stmt::Assign(a) => {
                    ids.push(a.id);
                    walk_expr(&a.target, &mut ids);
                    walk_expr(&a.value, &mut ids);
                }
                _ => {}
            }
        }
        let mut deduped = ids.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(ids.len(), deduped.len());
    }
}
