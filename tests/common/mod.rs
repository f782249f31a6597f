#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use queryx::{FieldType, Model, ModelDescriptor, Record, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    pub city: String,
}

impl Record for Address {
    fn field(&self, name: &str) -> Option<Value<'_>> {
        match name {
            "city" => Some(Value::from(&self.city)),
            _ => None,
        }
    }
}

impl Model for Address {
    fn descriptor() -> ModelDescriptor {
        ModelDescriptor::of::<Address>("Address").field("city", FieldType::String)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub total: f64,
    pub status: String,
}

impl Record for Order {
    fn field(&self, name: &str) -> Option<Value<'_>> {
        match name {
            "total" => Some(Value::from(self.total)),
            "status" => Some(Value::from(&self.status)),
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

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub age: i32,
    pub email: Option<String>,
    pub joined: DateTime<Utc>,
    pub address: Address,
    pub items: Vec<i32>,
    pub orders: Vec<Order>,
}

impl User {
    pub fn new(id: i32, name: &str, age: i32) -> Self {
        Self {
            id,
            name: name.to_string(),
            age,
            email: None,
            joined: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            address: Address {
                city: "Oslo".to_string(),
            },
            items: Vec::new(),
            orders: Vec::new(),
        }
    }

    pub fn with_items(mut self, items: &[i32]) -> Self {
        self.items = items.to_vec();
        self
    }

    pub fn with_city(mut self, city: &str) -> Self {
        self.address.city = city.to_string();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_order(mut self, total: f64, status: &str) -> Self {
        self.orders.push(Order {
            total,
            status: status.to_string(),
        });
        self
    }

    pub fn joined_on(mut self, year: i32, month: u32, day: u32) -> Self {
        self.joined = Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap();
        self
    }
}

impl Record for User {
    fn field(&self, name: &str) -> Option<Value<'_>> {
        match name {
            "id" => Some(Value::from(self.id)),
            "name" => Some(Value::from(&self.name)),
            "age" => Some(Value::from(self.age)),
            "email" => Some(Value::from(self.email.as_ref())),
            "joined" => Some(Value::from(self.joined)),
            "address" => Some(Value::Record(&self.address)),
            "items" => Some(Value::list(&self.items)),
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
            .field("joined", FieldType::DateTime)
            .field("address", FieldType::model::<Address>())
            .field("items", FieldType::list(FieldType::Int))
            .field("orders", FieldType::list(FieldType::model::<Order>()))
    }
}

/// Two plain integer columns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pair {
    pub a: i32,
    pub b: i32,
}

impl Record for Pair {
    fn field(&self, name: &str) -> Option<Value<'_>> {
        match name {
            "a" => Some(Value::from(self.a)),
            "b" => Some(Value::from(self.b)),
            _ => None,
        }
    }
}

impl Model for Pair {
    fn descriptor() -> ModelDescriptor {
        ModelDescriptor::of::<Pair>("Pair")
            .field("a", FieldType::Int)
            .field("b", FieldType::Int)
    }
}

pub fn people() -> Vec<User> {
    vec![
        User::new(1, "John", 25),
        User::new(2, "Jane", 31),
        User::new(3, "Bob", 40),
    ]
}

pub fn summary(users: &[User]) -> Vec<(i32, &str, i32)> {
    users.iter().map(|u| (u.id, u.name.as_str(), u.age)).collect()
}
