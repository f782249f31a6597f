use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use queryx::config::MappingFile;
use queryx::lexer::Lexer;
use queryx::sql_compiler::{CollectionTable, SqlCompiler};
use queryx::{
    parse_filter, FieldType, Model, ModelDescriptor, QueryMappingConfig, QueryModel, QueryOptions,
    QueryPlan, Queryable, Record, Value,
};

const MAPPING_FILE: &str = "queryx.json";

#[derive(Debug, Clone)]
struct Order {
    total: f64,
    status: &'static str,
}

impl Record for Order {
    fn field(&self, name: &str) -> Option<Value<'_>> {
        match name {
            "total" => Some(Value::from(self.total)),
            "status" => Some(Value::str(self.status)),
            _ => None,
        }
    }
}

impl Model for Order {
    fn descriptor() -> ModelDescriptor {
        ModelDescriptor::of::<Order>("Order")
            .field("total", FieldType::Float)
            .field("status", FieldType::String)
    }
}

#[derive(Debug, Clone)]
struct User {
    id: i32,
    name: &'static str,
    age: i32,
    email: Option<&'static str>,
    tags: Vec<&'static str>,
    orders: Vec<Order>,
}

impl Record for User {
    fn field(&self, name: &str) -> Option<Value<'_>> {
        match name {
            "id" => Some(Value::from(self.id)),
            "name" => Some(Value::str(self.name)),
            "age" => Some(Value::from(self.age)),
            "email" => Some(self.email.map_or(Value::Null, Value::str)),
            "tags" => Some(Value::List(self.tags.iter().map(|t| Value::str(t)).collect())),
            "orders" => Some(Value::records(&self.orders)),
            _ => None,
        }
    }
}

impl Model for User {
    fn descriptor() -> ModelDescriptor {
        ModelDescriptor::of::<User>("User")
            .field("id", FieldType::Int)
            .field("name", FieldType::String)
            .field("age", FieldType::Int)
            .field("email", FieldType::String)
            .field("tags", FieldType::list(FieldType::String))
            .field("orders", FieldType::list(FieldType::model::<Order>()))
    }
}

fn users() -> Vec<User> {
    vec![
        User {
            id: 1,
            name: "John",
            age: 25,
            email: Some("john@example.com"),
            tags: vec!["new"],
            orders: vec![Order {
                total: 12.5,
                status: "shipped",
            }],
        },
        User {
            id: 2,
            name: "Jane",
            age: 31,
            email: None,
            tags: vec!["vip", "beta"],
            orders: vec![
                Order {
                    total: 250.0,
                    status: "shipped",
                },
                Order {
                    total: 40.0,
                    status: "pending",
                },
            ],
        },
        User {
            id: 3,
            name: "Bob",
            age: 40,
            email: Some("bob@example.com"),
            tags: vec![],
            orders: vec![],
        },
    ]
}

struct Session {
    config: QueryMappingConfig,
    compiler: SqlCompiler,
    query: QueryModel,
}

impl Session {
    fn load() -> Self {
        let defaults = QueryMappingConfig::new().for_model::<User>(|m| {
            m.property("name").map_from("fullName");
            m.property("email").map_from("mail");
        });
        let (config, compiler) = match MappingFile::from_json_file(MAPPING_FILE) {
            Ok(file) => (file.configure::<User>(defaults), file.sql_compiler("User")),
            Err(e) => {
                log::info!("{}, using built-in mapping", e);
                let compiler = SqlCompiler::new()
                    .with_collection(
                        "tags",
                        CollectionTable::new("user_tags", "user_id").value_column("tag"),
                    )
                    .with_collection("orders", CollectionTable::new("orders", "user_id"));
                (defaults, compiler)
            }
        };
        Self {
            config,
            compiler,
            query: QueryModel::default(),
        }
    }

    /// Returns false when the session should end.
    fn handle(&mut self, line: &str) -> Result<bool> {
        let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();
        match command {
            ":quit" | ":q" => return Ok(false),
            ":help" => print_help(),
            ":order" => self.query.order_by = arg.to_string(),
            ":offset" => self.query.offset = parse_number(arg)?,
            ":limit" => self.query.limit = parse_number(arg)?,
            ":strict" => {
                let strict = matches!(arg, "on" | "true" | "1");
                self.config = self.config.clone().with_options(QueryOptions { strict });
            }
            ":show" => println!("{:?} strict={}", self.query, self.config.is_strict()),
            _ if command.starts_with(':') => println!("unknown command {}, try :help", command),
            _ => {
                self.query.filter = line.to_string();
                self.run();
            }
        }
        Ok(true)
    }

    fn run(&self) {
        let tokens: Vec<_> = Lexer::new(&self.query.filter).map(|t| t.kind).collect();
        println!("tokens: {:?}", tokens);

        match parse_filter(&self.query.filter) {
            Ok(ast) => println!("ast: {:#?}", ast),
            Err(e) => {
                println!("error: {}", e);
                return;
            }
        }

        let plan = match QueryPlan::compile::<User>(&self.query, &self.config) {
            Ok(plan) => plan,
            Err(e) => {
                println!("error: {}", e);
                return;
            }
        };

        match self.compiler.compile(&plan, "User") {
            Ok(result) => {
                println!("sql:   {}", result.sql);
                println!("count: {}", result.count_sql);
                for opt in &result.optimizations {
                    println!("  applied {:?}", opt);
                }
            }
            Err(e) => println!("sql: unavailable ({})", e),
        }

        let rows = plan.apply(users());
        println!("{} row(s):", rows.count());
        for user in &rows {
            println!("  {:>2} {:<5} {:>3} {:?}", user.id, user.name, user.age, user.tags);
        }
    }
}

fn parse_number(arg: &str) -> Result<Option<i64>> {
    if arg.is_empty() {
        return Ok(None);
    }
    let n = arg.parse().with_context(|| format!("not a number: {arg}"))?;
    Ok(Some(n))
}

fn print_help() {
    println!("enter a filter, e.g. name=-*'jo'|age>=30");
    println!("  :order <expr>   set ordering, e.g. -age,name");
    println!("  :offset <n>     skip n rows (empty to clear)");
    println!("  :limit <n>      keep n rows (empty to clear)");
    println!("  :strict on|off  fail on unknown properties");
    println!("  :show           print the current query");
    println!("  :quit");
}

fn main() -> Result<()> {
    env_logger::init();

    let mut session = Session::load();

    // One-shot mode: queryx '<filter>' ['<order by>']
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Some(filter) = args.first() {
        session.query.order_by = args.get(1).cloned().unwrap_or_default();
        session.handle(filter)?;
        return Ok(());
    }

    println!("queryx demo over {} users, :help for commands", users().len());
    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("queryx> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(line)?;
                match session.handle(line) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("error: {:#}", e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
