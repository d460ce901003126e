//! Module resolver: loads `подключить`/`из ... подключить` targets, detects import cycles,
//! mangles imported symbols into the importing module's flat namespace, and expands a partial
//! `из ... подключить` request into its dependency closure. Grounded on the reference
//! `module_loader.py`.

use crate::ast::{Expr, ExprKind, FuncDecl, ImportItem, Program, Stmt};
use crate::config::{ModulesConfig, ProjectConfig};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use yasny_core::Diagnostic;

/// Builtin names visible at every scope without import — never treated as a module dependency.
pub const BUILTIN_NAMES: &[&str] = &[
    "печать", "длина", "диапазон", "ввод", "пауза", "строка", "число",
    "запустить", "готово", "ожидать", "ожидать_все", "отменить",
];

struct ResolvedModule {
    program: Program,
    exports: HashMap<String, Stmt>,
    export_order: Vec<String>,
    tag: String,
}

pub struct ModuleResolver {
    resolved: HashMap<PathBuf, ResolvedModule>,
    resolving_stack: Vec<PathBuf>,
    project_root: Option<PathBuf>,
    config: ModulesConfig,
    tags: HashMap<PathBuf, String>,
}

impl ModuleResolver {
    pub fn new() -> Self {
        ModuleResolver {
            resolved: HashMap::new(),
            resolving_stack: Vec::new(),
            project_root: None,
            config: ModulesConfig::default(),
            tags: HashMap::new(),
        }
    }

    pub fn resolve_entry(&mut self, program: Program, entry_path: Option<&Path>) -> Result<Program, Diagnostic> {
        let entry = match entry_path {
            Some(p) => normalize_path(p),
            None => std::env::current_dir().unwrap_or_default().join("<stdin>"),
        };
        self.init_project_context(&entry);
        let resolved = self.resolve_module(&entry, Some(program), true)?;
        Ok(resolved.program.clone())
    }

    fn init_project_context(&mut self, entry: &Path) {
        let base = if entry.is_dir() { entry.to_path_buf() } else { entry.parent().unwrap_or(entry).to_path_buf() };
        let mut found_project = None;
        let mut found_config: Option<PathBuf> = None;

        for cur in std::iter::once(base.as_path()).chain(base.ancestors().skip(1)) {
            if cur.join("yasn.toml").exists() {
                found_project = Some(cur.to_path_buf());
                found_config = Some(cur.join("yasn.toml"));
                break;
            }
            if cur.join("yasny.toml").exists() {
                found_project = Some(cur.to_path_buf());
                found_config = Some(cur.join("yasny.toml"));
                break;
            }
            if found_project.is_none() && cur.join("pyproject.toml").exists() {
                found_project = Some(cur.to_path_buf());
            }
        }

        self.project_root = found_project;
        if let Some(config_path) = found_config {
            if let Ok(project) = ProjectConfig::load(&config_path) {
                if let Some(modules) = project.modules {
                    self.config = modules;
                }
            }
        }
    }

    fn resolve_module(
        &mut self,
        module_path: &Path,
        program: Option<Program>,
        is_entry: bool,
    ) -> Result<&ResolvedModule, Diagnostic> {
        let module_path = normalize_path(module_path);
        if self.resolved.contains_key(&module_path) {
            return Ok(&self.resolved[&module_path]);
        }
        if self.resolving_stack.contains(&module_path) {
            let mut chain: Vec<String> =
                self.resolving_stack.iter().map(|p| p.display().to_string()).collect();
            chain.push(module_path.display().to_string());
            return Err(Diagnostic::new(format!("обнаружен циклический импорт: {}", chain.join(" -> ")))
                .with_path(module_path.display().to_string()));
        }

        self.resolving_stack.push(module_path.clone());
        let result = self.resolve_module_inner(&module_path, program, is_entry);
        self.resolving_stack.pop();
        let resolved = result?;
        self.resolved.insert(module_path.clone(), resolved);
        Ok(&self.resolved[&module_path])
    }

    fn resolve_module_inner(
        &mut self,
        module_path: &Path,
        program: Option<Program>,
        is_entry: bool,
    ) -> Result<ResolvedModule, Diagnostic> {
        let program = match program {
            Some(p) => p,
            None => {
                let source = std::fs::read_to_string(module_path)
                    .map_err(|e| Diagnostic::new(format!("не удалось прочитать модуль: {e}"))
                        .with_path(module_path.display().to_string()))?;
                parse_source(&source, module_path)?
            }
        };

        let linked = self.link_statements(program.statements, module_path, is_entry)?;
        let (exports, export_order) = collect_exports(&linked);
        let tag = self.module_tag(module_path);
        Ok(ResolvedModule { program: Program { statements: linked }, exports, export_order, tag })
    }

    fn link_statements(&mut self, statements: Vec<Stmt>, module_path: &Path, is_entry: bool) -> Result<Vec<Stmt>, Diagnostic> {
        let mut linked: Vec<Stmt> = Vec::new();
        let mut top_decl_names: HashSet<String> = HashSet::new();
        let mut import_name_map: HashMap<String, String> = HashMap::new();
        let mut namespace_map: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut non_import_seen = false;

        for stmt in statements {
            if stmt.is_import() {
                if non_import_seen {
                    let (line, col) = stmt.loc();
                    return Err(Diagnostic::at(
                        "операторы 'подключить'/'из ... подключить' должны идти до остальных объявлений",
                        line,
                        col,
                    )
                    .with_path(module_path.display().to_string()));
                }
                let imported = self.resolve_import(
                    stmt,
                    module_path,
                    &mut import_name_map,
                    &mut namespace_map,
                    &top_decl_names,
                )?;
                for stmt in imported {
                    if let Some(name) = decl_name(&stmt) {
                        if top_decl_names.contains(name) {
                            continue;
                        }
                        top_decl_names.insert(name.to_string());
                    }
                    linked.push(stmt);
                }
                continue;
            }

            non_import_seen = true;
            if !is_entry && !matches!(stmt, Stmt::VarDecl { .. } | Stmt::FuncDecl(_)) {
                let (line, col) = stmt.loc();
                return Err(Diagnostic::at(
                    "в подключаемом модуле разрешены только объявления и вложенные блоки внутри функций",
                    line,
                    col,
                )
                .with_path(module_path.display().to_string()));
            }

            if let Some(name) = decl_name(&stmt) {
                let (line, col) = stmt.loc();
                if import_name_map.contains_key(name) {
                    return Err(Diagnostic::at(
                        format!("конфликт имён: '{name}' уже импортировано в эту область"),
                        line,
                        col,
                    )
                    .with_path(module_path.display().to_string()));
                }
                if namespace_map.contains_key(name) {
                    return Err(Diagnostic::at(
                        format!("конфликт имён: '{name}' уже занято как пространство модуля"),
                        line,
                        col,
                    )
                    .with_path(module_path.display().to_string()));
                }
            }

            let rewritten = AliasRewriter::new(&import_name_map, &namespace_map).rewrite_stmt(stmt)?;
            let (line, col) = rewritten.loc();
            if let Some(name) = decl_name(&rewritten) {
                if top_decl_names.contains(name) {
                    return Err(Diagnostic::at(format!("конфликт имён: '{name}' уже объявлено"), line, col)
                        .with_path(module_path.display().to_string()));
                }
                top_decl_names.insert(name.to_string());
            }
            linked.push(rewritten);
        }

        Ok(linked)
    }

    fn resolve_import(
        &mut self,
        stmt: Stmt,
        current_module: &Path,
        import_name_map: &mut HashMap<String, String>,
        namespace_map: &mut HashMap<String, HashMap<String, String>>,
        top_decl_names: &HashSet<String>,
    ) -> Result<Vec<Stmt>, Diagnostic> {
        match stmt {
            Stmt::ImportAll { path, alias, line, col } => {
                self.resolve_import_all(&path, alias, current_module, line, col, import_name_map, namespace_map, top_decl_names)
            }
            Stmt::ImportFrom { path, items, line, col } => {
                self.resolve_import_from(&path, &items, current_module, line, col, import_name_map, top_decl_names)
            }
            _ => Ok(Vec::new()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_import_all(
        &mut self,
        raw_path: &str,
        alias: Option<String>,
        current_module: &Path,
        line: usize,
        col: usize,
        import_name_map: &mut HashMap<String, String>,
        namespace_map: &mut HashMap<String, HashMap<String, String>>,
        top_decl_names: &HashSet<String>,
    ) -> Result<Vec<Stmt>, Diagnostic> {
        let target = self.resolve_module_path(raw_path, current_module, line, col)?;
        self.resolve_module(&target, None, false)?;
        let names = self.resolved[&normalize_path(&target)].export_order.clone();
        let (materialized, expose_map) = self.materialize_imported_decls(&target, &names);
        let materialized = only_new(materialized, top_decl_names);

        if let Some(alias) = alias {
            if namespace_map.contains_key(&alias) || import_name_map.contains_key(&alias) || top_decl_names.contains(&alias) {
                return Err(Diagnostic::at(format!("конфликт имени пространства модулей: '{alias}'"), line, col)
                    .with_path(current_module.display().to_string()));
            }
            namespace_map.insert(alias, expose_map);
            return Ok(materialized);
        }

        for (exported_name, unique_name) in &expose_map {
            if import_name_map.contains_key(exported_name) || top_decl_names.contains(exported_name) {
                return Err(Diagnostic::at(
                    format!("конфликт имён при подключении: '{exported_name}' уже объявлено"),
                    line,
                    col,
                )
                .with_path(current_module.display().to_string()));
            }
            import_name_map.insert(exported_name.clone(), unique_name.clone());
        }
        Ok(materialized)
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_import_from(
        &mut self,
        raw_path: &str,
        items: &[ImportItem],
        current_module: &Path,
        line: usize,
        col: usize,
        import_name_map: &mut HashMap<String, String>,
        top_decl_names: &HashSet<String>,
    ) -> Result<Vec<Stmt>, Diagnostic> {
        let target = self.resolve_module_path(raw_path, current_module, line, col)?;
        self.resolve_module(&target, None, false)?;
        let target = normalize_path(&target);

        let mut requested_names = Vec::new();
        for item in items {
            if !self.resolved[&target].exports.contains_key(&item.name) {
                return Err(Diagnostic::at(
                    format!("символ '{}' не найден в модуле '{}'", item.name, target.display()),
                    line,
                    col,
                )
                .with_path(current_module.display().to_string()));
            }
            if !requested_names.contains(&item.name) {
                requested_names.push(item.name.clone());
            }
        }

        let include_set = self.expand_with_dependencies(&target, &requested_names);
        let (materialized, expose_map) = self.materialize_imported_decls(&target, &include_set);
        let materialized = only_new(materialized, top_decl_names);

        let mut seen_local_names = HashSet::new();
        for item in items {
            let local_name = item.alias.clone().unwrap_or_else(|| item.name.clone());
            if seen_local_names.contains(&local_name) {
                continue;
            }
            seen_local_names.insert(local_name.clone());
            if import_name_map.contains_key(&local_name) || top_decl_names.contains(&local_name) {
                return Err(Diagnostic::at(
                    format!("конфликт имён при подключении: '{local_name}' уже объявлено"),
                    line,
                    col,
                )
                .with_path(current_module.display().to_string()));
            }
            import_name_map.insert(local_name, expose_map[&item.name].clone());
        }
        Ok(materialized)
    }

    fn expand_with_dependencies(&self, target: &Path, roots: &[String]) -> Vec<String> {
        let resolved = &self.resolved[target];
        let export_names: HashSet<&String> = resolved.exports.keys().collect();
        let mut include_set: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: Vec<String> = roots.to_vec();

        while let Some(cur) = queue.pop() {
            if seen.contains(&cur) {
                continue;
            }
            seen.insert(cur.clone());
            include_set.push(cur.clone());
            if let Some(decl) = resolved.exports.get(&cur) {
                for dep in direct_dependencies(decl, &export_names) {
                    if !seen.contains(&dep) {
                        queue.push(dep);
                    }
                }
            }
        }
        include_set
    }

    fn materialize_imported_decls(&self, target: &Path, names: &[String]) -> (Vec<Stmt>, HashMap<String, String>) {
        let resolved = &self.resolved[target];
        let selected: HashSet<&String> = names.iter().filter(|n| resolved.exports.contains_key(*n)).collect();

        let mut rename_map: HashMap<String, String> = HashMap::new();
        for name in &selected {
            rename_map.insert((*name).clone(), self.unique_symbol_name(&resolved.tag, name));
        }

        let mut materialized = Vec::new();
        let renamer = RenameSymbols::new(&rename_map);
        for stmt in &resolved.program.statements {
            match decl_name(stmt) {
                Some(n) if selected.contains(&n.to_string()) => {}
                _ => continue,
            }
            let mut renamed = renamer.rewrite_stmt(stmt.clone());
            match &mut renamed {
                Stmt::VarDecl { exported, .. } => *exported = false,
                Stmt::FuncDecl(f) => f.exported = false,
                _ => {}
            }
            materialized.push(renamed);
        }
        (materialized, rename_map)
    }

    fn resolve_module_path(&self, raw_path: &str, current_module: &Path, line: usize, col: usize) -> Result<PathBuf, Diagnostic> {
        let mut path = PathBuf::from(raw_path);
        if path.extension().is_none() {
            path.set_extension("яс");
        }

        let mut candidates: Vec<PathBuf> = Vec::new();
        if path.is_absolute() {
            candidates.push(normalize_path(&path));
        } else {
            candidates.push(normalize_path(&current_module.parent().unwrap_or(current_module).join(&path)));
            if let Some(project_root) = &self.project_root {
                if let Some(root) = &self.config.root {
                    candidates.push(normalize_path(&project_root.join(root).join(&path)));
                }
                for extra in &self.config.paths {
                    candidates.push(normalize_path(&project_root.join(extra).join(&path)));
                }
            }
        }

        let mut dedup = Vec::new();
        let mut seen = HashSet::new();
        for candidate in candidates {
            if seen.insert(candidate.clone()) {
                dedup.push(candidate);
            }
        }

        for candidate in &dedup {
            if candidate.exists() {
                return Ok(candidate.clone());
            }
        }

        let tried: Vec<String> = dedup.iter().map(|p| p.display().to_string()).collect();
        Err(Diagnostic::at(
            format!("модуль не найден: '{raw_path}'. проверены пути: {}", tried.join("; ")),
            line,
            col,
        )
        .with_path(current_module.display().to_string()))
    }

    fn module_tag(&mut self, path: &Path) -> String {
        if let Some(tag) = self.tags.get(path) {
            return tag.clone();
        }
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(path.display().to_string().as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        let tag = format!("мод_{}", &hex[..8]);
        self.tags.insert(path.to_path_buf(), tag.clone());
        tag
    }

    fn unique_symbol_name(&self, tag: &str, original: &str) -> String {
        format!("__{tag}_{original}")
    }
}

impl Default for ModuleResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn only_new(materialized: Vec<Stmt>, top_decl_names: &HashSet<String>) -> Vec<Stmt> {
    materialized
        .into_iter()
        .filter(|stmt| decl_name(stmt).map(|n| !top_decl_names.contains(n)).unwrap_or(true))
        .collect()
}

fn decl_name(stmt: &Stmt) -> Option<&str> {
    match stmt {
        Stmt::VarDecl { name, .. } => Some(name),
        Stmt::FuncDecl(f) => Some(&f.name),
        _ => None,
    }
}

fn collect_exports(statements: &[Stmt]) -> (HashMap<String, Stmt>, Vec<String>) {
    let decls: Vec<&Stmt> = statements.iter().filter(|s| matches!(s, Stmt::VarDecl { .. } | Stmt::FuncDecl(_))).collect();
    let explicit = decls.iter().any(|s| is_exported(s));

    let mut exports = HashMap::new();
    let mut order = Vec::new();
    for stmt in decls {
        let Some(name) = decl_name(stmt) else { continue };
        if name == "main" || name.starts_with("__мод_") {
            continue;
        }
        if explicit && !is_exported(stmt) {
            continue;
        }
        exports.insert(name.to_string(), stmt.clone());
        order.push(name.to_string());
    }
    (exports, order)
}

fn is_exported(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::VarDecl { exported, .. } => *exported,
        Stmt::FuncDecl(f) => f.exported,
        _ => false,
    }
}

fn parse_source(source: &str, path: &Path) -> Result<Program, Diagnostic> {
    let path_str = path.display().to_string();
    let tokens = crate::lexer::tokenize(source, Some(&path_str))?;
    crate::parser::parse(tokens, Some(&path_str))
}

/// Lexical path normalization (no filesystem access): collapses `.`/`..` the way `Path.resolve()`
/// does for paths that may not exist yet.
fn normalize_path(path: &Path) -> PathBuf {
    let base = if path.is_absolute() {
        PathBuf::new()
    } else {
        std::env::current_dir().unwrap_or_default()
    };
    let mut out = base;
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            Component::Normal(part) => out.push(part),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::Prefix(p) => out.push(p.as_os_str()),
        }
    }
    out
}

fn direct_dependencies(stmt: &Stmt, export_names: &HashSet<&String>) -> HashSet<String> {
    let mut collector = DependencyCollector::new(export_names);
    match stmt {
        Stmt::VarDecl { name, value, .. } => {
            collector.collect_expr(value);
            collector.deps.remove(name);
        }
        Stmt::FuncDecl(f) => {
            collector.collect_function(f);
            collector.deps.remove(&f.name);
        }
        _ => {}
    }
    collector.deps
}

struct DependencyCollector<'a> {
    export_names: &'a HashSet<&'a String>,
    deps: HashSet<String>,
    scopes: Vec<HashSet<String>>,
}

impl<'a> DependencyCollector<'a> {
    fn new(export_names: &'a HashSet<&'a String>) -> Self {
        DependencyCollector { export_names, deps: HashSet::new(), scopes: Vec::new() }
    }

    fn collect_function(&mut self, f: &FuncDecl) {
        self.push_scope();
        for param in &f.params {
            self.define(&param.name);
        }
        for stmt in &f.body {
            self.collect_stmt(stmt);
        }
        self.pop_scope();
    }

    fn collect_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl { name, value, .. } => {
                self.collect_expr(value);
                self.define(name);
            }
            Stmt::Assign { name, value, .. } => {
                self.consider_name(name);
                self.collect_expr(value);
            }
            Stmt::IndexAssign { target, index, value, .. } => {
                self.collect_expr(target);
                self.collect_expr(index);
                self.collect_expr(value);
            }
            Stmt::FuncDecl(f) => self.collect_function(f),
            Stmt::If { condition, then_body, else_body, .. } => {
                self.collect_expr(condition);
                self.push_scope();
                for s in then_body {
                    self.collect_stmt(s);
                }
                self.pop_scope();
                if let Some(else_body) = else_body {
                    self.push_scope();
                    for s in else_body {
                        self.collect_stmt(s);
                    }
                    self.pop_scope();
                }
            }
            Stmt::While { condition, body, .. } => {
                self.collect_expr(condition);
                self.push_scope();
                for s in body {
                    self.collect_stmt(s);
                }
                self.pop_scope();
            }
            Stmt::For { var_name, iterable, body, .. } => {
                self.collect_expr(iterable);
                self.push_scope();
                self.define(var_name);
                for s in body {
                    self.collect_stmt(s);
                }
                self.pop_scope();
            }
            Stmt::Return { value, .. } => self.collect_expr(value),
            Stmt::ExprStmt { expr, .. } => self.collect_expr(expr),
            Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::ImportAll { .. } | Stmt::ImportFrom { .. } => {}
        }
    }

    fn collect_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Identifier(name) => self.consider_name(name),
            ExprKind::Literal(_) => {}
            ExprKind::List(items) => items.iter().for_each(|e| self.collect_expr(e)),
            ExprKind::Dict(entries) => {
                for (k, v) in entries {
                    self.collect_expr(k);
                    self.collect_expr(v);
                }
            }
            ExprKind::Unary { operand, .. } => self.collect_expr(operand),
            ExprKind::Binary { left, right, .. } => {
                self.collect_expr(left);
                self.collect_expr(right);
            }
            ExprKind::Index { target, index } => {
                self.collect_expr(target);
                self.collect_expr(index);
            }
            ExprKind::Member { target, .. } => self.collect_expr(target),
            ExprKind::Call { callee, args } => {
                self.collect_expr(callee);
                args.iter().for_each(|e| self.collect_expr(e));
            }
            ExprKind::Await(inner) => self.collect_expr(inner),
        }
    }

    fn consider_name(&mut self, name: &str) {
        if BUILTIN_NAMES.contains(&name) || self.is_local(name) {
            return;
        }
        if self.export_names.contains(&name.to_string()) {
            self.deps.insert(name.to_string());
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|s| s.contains(name))
    }

    fn define(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashSet::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }
}

/// Rewrites bare imported names to their unique mangled forms in the importing module's
/// statements, and resolves `namespace.member` access against an aliased import's expose map.
struct AliasRewriter<'a> {
    name_map: &'a HashMap<String, String>,
    namespace_map: &'a HashMap<String, HashMap<String, String>>,
    scopes: Vec<HashSet<String>>,
}

impl<'a> AliasRewriter<'a> {
    fn new(name_map: &'a HashMap<String, String>, namespace_map: &'a HashMap<String, HashMap<String, String>>) -> Self {
        AliasRewriter { name_map, namespace_map, scopes: Vec::new() }
    }

    fn rewrite_stmt(&mut self, stmt: Stmt) -> Result<Stmt, Diagnostic> {
        Ok(match stmt {
            Stmt::VarDecl { name, type_ann, value, exported, line, col } => {
                let value = self.rewrite_expr(value)?;
                self.define(&name);
                Stmt::VarDecl { name, type_ann, value, exported, line, col }
            }
            Stmt::Assign { name, value, line, col } => {
                let resolved_name = if !self.is_local(&name) { self.name_map.get(&name).cloned().unwrap_or(name) } else { name };
                let value = self.rewrite_expr(value)?;
                Stmt::Assign { name: resolved_name, value, line, col }
            }
            Stmt::IndexAssign { target, index, value, line, col } => Stmt::IndexAssign {
                target: self.rewrite_expr(target)?,
                index: self.rewrite_expr(index)?,
                value: self.rewrite_expr(value)?,
                line,
                col,
            },
            Stmt::FuncDecl(f) => {
                self.push_scope();
                for p in &f.params {
                    self.define(&p.name);
                }
                let body = f.body.into_iter().map(|s| self.rewrite_stmt(s)).collect::<Result<_, _>>()?;
                self.pop_scope();
                Stmt::FuncDecl(FuncDecl { body, ..f })
            }
            Stmt::If { condition, then_body, else_body, line, col } => {
                let condition = self.rewrite_expr(condition)?;
                self.push_scope();
                let then_body = then_body.into_iter().map(|s| self.rewrite_stmt(s)).collect::<Result<_, _>>()?;
                self.pop_scope();
                let else_body = match else_body {
                    Some(body) => {
                        self.push_scope();
                        let body = body.into_iter().map(|s| self.rewrite_stmt(s)).collect::<Result<_, _>>()?;
                        self.pop_scope();
                        Some(body)
                    }
                    None => None,
                };
                Stmt::If { condition, then_body, else_body, line, col }
            }
            Stmt::While { condition, body, line, col } => {
                let condition = self.rewrite_expr(condition)?;
                self.push_scope();
                let body = body.into_iter().map(|s| self.rewrite_stmt(s)).collect::<Result<_, _>>()?;
                self.pop_scope();
                Stmt::While { condition, body, line, col }
            }
            Stmt::For { var_name, iterable, body, line, col } => {
                let iterable = self.rewrite_expr(iterable)?;
                self.push_scope();
                self.define(&var_name);
                let body = body.into_iter().map(|s| self.rewrite_stmt(s)).collect::<Result<_, _>>()?;
                self.pop_scope();
                Stmt::For { var_name, iterable, body, line, col }
            }
            Stmt::Return { value, line, col } => Stmt::Return { value: self.rewrite_expr(value)?, line, col },
            Stmt::ExprStmt { expr, line, col } => Stmt::ExprStmt { expr: self.rewrite_expr(expr)?, line, col },
            other => other,
        })
    }

    fn rewrite_expr(&mut self, expr: Expr) -> Result<Expr, Diagnostic> {
        let Expr { kind, line, col, inferred_type } = expr;
        let kind = match kind {
            ExprKind::Identifier(name) => {
                if !self.is_local(&name) {
                    if let Some(mapped) = self.name_map.get(&name) {
                        ExprKind::Identifier(mapped.clone())
                    } else {
                        ExprKind::Identifier(name)
                    }
                } else {
                    ExprKind::Identifier(name)
                }
            }
            ExprKind::Member { target, member } => {
                let target = self.rewrite_expr(*target)?;
                if let ExprKind::Identifier(ns_name) = &target.kind {
                    if let Some(ns) = self.namespace_map.get(ns_name) {
                        let Some(mapped) = ns.get(&member) else {
                            return Err(Diagnostic::at(
                                format!("модуль '{ns_name}' не содержит символ '{member}'"),
                                line,
                                col,
                            ));
                        };
                        return Ok(Expr::new(ExprKind::Identifier(mapped.clone()), line, col));
                    }
                }
                // §4.3: access through '.' is only legal against a namespace alias; anything else
                // (a plain local, an unaliased identifier, any other expression) is rejected here
                // rather than left to surface as a worse error downstream.
                return Err(Diagnostic::at(
                    format!("доступ через точку к '{member}' недопустим: цель не является псевдонимом модуля"),
                    line,
                    col,
                ));
            }
            ExprKind::Literal(l) => ExprKind::Literal(l),
            ExprKind::List(items) => {
                ExprKind::List(items.into_iter().map(|e| self.rewrite_expr(e)).collect::<Result<_, _>>()?)
            }
            ExprKind::Dict(entries) => ExprKind::Dict(
                entries
                    .into_iter()
                    .map(|(k, v)| Ok((self.rewrite_expr(k)?, self.rewrite_expr(v)?)))
                    .collect::<Result<_, Diagnostic>>()?,
            ),
            ExprKind::Unary { op, operand } => ExprKind::Unary { op, operand: Box::new(self.rewrite_expr(*operand)?) },
            ExprKind::Binary { op, left, right } => ExprKind::Binary {
                op,
                left: Box::new(self.rewrite_expr(*left)?),
                right: Box::new(self.rewrite_expr(*right)?),
            },
            ExprKind::Index { target, index } => ExprKind::Index {
                target: Box::new(self.rewrite_expr(*target)?),
                index: Box::new(self.rewrite_expr(*index)?),
            },
            ExprKind::Call { callee, args } => ExprKind::Call {
                callee: Box::new(self.rewrite_expr(*callee)?),
                args: args.into_iter().map(|e| self.rewrite_expr(e)).collect::<Result<_, _>>()?,
            },
            ExprKind::Await(inner) => ExprKind::Await(Box::new(self.rewrite_expr(*inner)?)),
        };
        Ok(Expr { kind, line, col, inferred_type })
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashSet::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn define(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|s| s.contains(name))
    }
}

/// Renames every declaration (and reference to it) in a set of materialized imported statements
/// to its unique mangled name. Unlike [`AliasRewriter`], `Member` is not namespace-resolved here
/// — imported declarations never carry an unresolved namespace access by construction.
struct RenameSymbols<'a> {
    rename_map: &'a HashMap<String, String>,
}

impl<'a> RenameSymbols<'a> {
    fn new(rename_map: &'a HashMap<String, String>) -> Self {
        RenameSymbols { rename_map }
    }

    fn rewrite_stmt(&self, stmt: Stmt) -> Stmt {
        let mut scopes: Vec<HashSet<String>> = Vec::new();
        self.rewrite_stmt_scoped(stmt, &mut scopes)
    }

    fn rewrite_stmt_scoped(&self, stmt: Stmt, scopes: &mut Vec<HashSet<String>>) -> Stmt {
        match stmt {
            Stmt::VarDecl { name, type_ann, value, exported, line, col } => {
                let value = self.rewrite_expr_scoped(value, scopes);
                let name = self.rename_map.get(&name).cloned().unwrap_or(name);
                if let Some(scope) = scopes.last_mut() {
                    scope.insert(name.clone());
                }
                Stmt::VarDecl { name, type_ann, value, exported, line, col }
            }
            Stmt::Assign { name, value, line, col } => {
                let resolved = if !is_local(scopes, &name) { self.rename_map.get(&name).cloned().unwrap_or(name) } else { name };
                let value = self.rewrite_expr_scoped(value, scopes);
                Stmt::Assign { name: resolved, value, line, col }
            }
            Stmt::IndexAssign { target, index, value, line, col } => Stmt::IndexAssign {
                target: self.rewrite_expr_scoped(target, scopes),
                index: self.rewrite_expr_scoped(index, scopes),
                value: self.rewrite_expr_scoped(value, scopes),
                line,
                col,
            },
            Stmt::FuncDecl(f) => {
                let name = self.rename_map.get(&f.name).cloned().unwrap_or(f.name);
                scopes.push(HashSet::new());
                for p in &f.params {
                    scopes.last_mut().unwrap().insert(p.name.clone());
                }
                let body = f.body.into_iter().map(|s| self.rewrite_stmt_scoped(s, scopes)).collect();
                scopes.pop();
                Stmt::FuncDecl(FuncDecl { name, body, ..f })
            }
            Stmt::If { condition, then_body, else_body, line, col } => {
                let condition = self.rewrite_expr_scoped(condition, scopes);
                scopes.push(HashSet::new());
                let then_body = then_body.into_iter().map(|s| self.rewrite_stmt_scoped(s, scopes)).collect();
                scopes.pop();
                let else_body = else_body.map(|body| {
                    scopes.push(HashSet::new());
                    let b = body.into_iter().map(|s| self.rewrite_stmt_scoped(s, scopes)).collect();
                    scopes.pop();
                    b
                });
                Stmt::If { condition, then_body, else_body, line, col }
            }
            Stmt::While { condition, body, line, col } => {
                let condition = self.rewrite_expr_scoped(condition, scopes);
                scopes.push(HashSet::new());
                let body = body.into_iter().map(|s| self.rewrite_stmt_scoped(s, scopes)).collect();
                scopes.pop();
                Stmt::While { condition, body, line, col }
            }
            Stmt::For { var_name, iterable, body, line, col } => {
                let iterable = self.rewrite_expr_scoped(iterable, scopes);
                scopes.push(HashSet::new());
                scopes.last_mut().unwrap().insert(var_name.clone());
                let body = body.into_iter().map(|s| self.rewrite_stmt_scoped(s, scopes)).collect();
                scopes.pop();
                Stmt::For { var_name, iterable, body, line, col }
            }
            Stmt::Return { value, line, col } => Stmt::Return { value: self.rewrite_expr_scoped(value, scopes), line, col },
            Stmt::ExprStmt { expr, line, col } => {
                Stmt::ExprStmt { expr: self.rewrite_expr_scoped(expr, scopes), line, col }
            }
            other => other,
        }
    }

    fn rewrite_expr_scoped(&self, expr: Expr, scopes: &mut Vec<HashSet<String>>) -> Expr {
        let Expr { kind, line, col, inferred_type } = expr;
        let kind = match kind {
            ExprKind::Identifier(name) => {
                if !is_local(scopes, &name) {
                    ExprKind::Identifier(self.rename_map.get(&name).cloned().unwrap_or(name))
                } else {
                    ExprKind::Identifier(name)
                }
            }
            ExprKind::Member { target, member } => {
                ExprKind::Member { target: Box::new(self.rewrite_expr_scoped(*target, scopes)), member }
            }
            ExprKind::Literal(l) => ExprKind::Literal(l),
            ExprKind::List(items) => ExprKind::List(items.into_iter().map(|e| self.rewrite_expr_scoped(e, scopes)).collect()),
            ExprKind::Dict(entries) => ExprKind::Dict(
                entries
                    .into_iter()
                    .map(|(k, v)| (self.rewrite_expr_scoped(k, scopes), self.rewrite_expr_scoped(v, scopes)))
                    .collect(),
            ),
            ExprKind::Unary { op, operand } => {
                ExprKind::Unary { op, operand: Box::new(self.rewrite_expr_scoped(*operand, scopes)) }
            }
            ExprKind::Binary { op, left, right } => ExprKind::Binary {
                op,
                left: Box::new(self.rewrite_expr_scoped(*left, scopes)),
                right: Box::new(self.rewrite_expr_scoped(*right, scopes)),
            },
            ExprKind::Index { target, index } => ExprKind::Index {
                target: Box::new(self.rewrite_expr_scoped(*target, scopes)),
                index: Box::new(self.rewrite_expr_scoped(*index, scopes)),
            },
            ExprKind::Call { callee, args } => ExprKind::Call {
                callee: Box::new(self.rewrite_expr_scoped(*callee, scopes)),
                args: args.into_iter().map(|e| self.rewrite_expr_scoped(e, scopes)).collect(),
            },
            ExprKind::Await(inner) => ExprKind::Await(Box::new(self.rewrite_expr_scoped(*inner, scopes))),
        };
        Expr { kind, line, col, inferred_type }
    }
}

fn is_local(scopes: &[HashSet<String>], name: &str) -> bool {
    scopes.iter().rev().any(|s| s.contains(name))
}

/// Entry point used by the pipeline: parses `source`, then resolves and links its imports.
pub fn resolve_modules(source: &str, path: Option<&Path>) -> Result<Program, Diagnostic> {
    tracing::debug!(path = ?path, "resolving module imports");
    let program = parse_source(source, path.unwrap_or(Path::new("<stdin>")))?;
    let mut resolver = ModuleResolver::new();
    let resolved = resolver.resolve_entry(program, path)?;
    tracing::debug!(statement_count = resolved.statements.len(), "module resolution complete");
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn resolves_entry_without_imports() {
        let program = resolve_modules("пусть x = 1\n", None).unwrap();
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn import_from_mangles_symbol_and_expands_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let lib_path = dir.path().join("lib.яс");
        std::fs::write(&lib_path, "экспорт функция helper() -> Цел:\n    вернуть 1\n\nэкспорт функция main2() -> Цел:\n    вернуть helper()\n").unwrap();
        let entry_path = dir.path().join("main.яс");
        let mut f = std::fs::File::create(&entry_path).unwrap();
        writeln!(f, "из \"lib.яс\" подключить main2").unwrap();

        let program = resolve_modules(&std::fs::read_to_string(&entry_path).unwrap(), Some(&entry_path)).unwrap();
        let names: Vec<&str> = program.statements.iter().filter_map(decl_name).collect();
        assert!(names.iter().any(|n| n.contains("main2")));
        assert!(names.iter().any(|n| n.contains("helper")), "dependency closure should pull in helper: {names:?}");
    }

    #[test]
    fn detects_import_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.яс");
        let b_path = dir.path().join("b.яс");
        std::fs::write(&a_path, "подключить \"b.яс\"\n").unwrap();
        std::fs::write(&b_path, "подключить \"a.яс\"\n").unwrap();

        let err = resolve_modules(&std::fs::read_to_string(&a_path).unwrap(), Some(&a_path)).unwrap_err();
        assert!(err.message.contains("циклический"));
    }

    #[test]
    fn namespace_alias_resolves_member_access() {
        let dir = tempfile::tempdir().unwrap();
        let lib_path = dir.path().join("lib.яс");
        std::fs::write(&lib_path, "экспорт функция helper() -> Цел:\n    вернуть 1\n").unwrap();
        let entry_path = dir.path().join("main.яс");
        let source = "подключить \"lib.яс\" как lib\nlib.helper()\n";
        std::fs::write(&entry_path, source).unwrap();

        let program = resolve_modules(source, Some(&entry_path)).unwrap();
        assert!(program.statements.iter().any(|s| matches!(s, Stmt::ExprStmt { .. })));
    }

    #[test]
    fn missing_module_reports_checked_paths() {
        let err = resolve_modules("подключить \"does-not-exist.яс\"\n", None).unwrap_err();
        assert!(err.message.contains("модуль не найден"));
    }

    #[test]
    fn member_access_against_a_non_alias_target_is_rejected_at_resolution() {
        let err = resolve_modules("пусть x = 1\nx.что_то\n", None).unwrap_err();
        assert!(err.message.contains("не является псевдонимом модуля"), "unexpected message: {}", err.message);
    }
}
