//! Customer identity store
//!
//! The token service resolves refresh-token subjects through this trait.
//! Two backends are provided: an in-memory store for development and tests,
//! and a PostgreSQL store using SQLx.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use crate::{Customer, CustomerStatus, MilkmanError, Result};

/// Trait for customer identity operations
#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// Insert a new customer, returning it with its row id assigned
    ///
    /// Fails with `Conflict` when an active customer already holds the same
    /// primary phone or email. The check and the write are atomic.
    async fn insert(&self, customer: Customer) -> Result<Customer>;

    /// Replace the stored record with the same `customer_id`
    ///
    /// Fails with `NotFound` when no such record exists and with `Conflict`
    /// when the new phone or email is held by another active customer.
    async fn update(&self, customer: Customer) -> Result<Customer>;

    /// Active customer whose primary phone matches
    async fn find_active_by_phone(&self, phone: &str) -> Result<Option<Customer>>;

    /// Active customer who logs in with this email or phone
    async fn find_active_by_login(&self, email_or_phone: &str) -> Result<Option<Customer>>;

    /// Active customers sharing the given email or primary phone
    async fn find_active_conflicts(
        &self,
        email: Option<&str>,
        phone: &str,
    ) -> Result<Vec<Customer>>;

    /// Customer by public identifier, regardless of status
    async fn find_by_customer_id(&self, customer_id: &str) -> Result<Option<Customer>>;

    /// All customers
    async fn list(&self) -> Result<Vec<Customer>>;

    /// Delete by public identifier; returns whether a row was removed
    async fn delete(&self, customer_id: &str) -> Result<bool>;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<()>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory customer store
#[derive(Default)]
pub struct MemoryCustomerStore {
    customers: RwLock<Vec<Customer>>,
    next_id: AtomicI64,
}

impl MemoryCustomerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Whether `other` is a distinct active customer sharing `customer`'s phone or email
fn clashes(customer: &Customer, other: &Customer) -> bool {
    other.customer_id != customer.customer_id
        && customer.is_active()
        && other.is_active()
        && (other.primary_phone == customer.primary_phone
            || (customer.email_id.is_some() && other.email_id == customer.email_id))
}

fn already_registered() -> MilkmanError {
    MilkmanError::Conflict("phone number or email already registered".to_string())
}

#[async_trait]
impl CustomerStore for MemoryCustomerStore {
    async fn insert(&self, mut customer: Customer) -> Result<Customer> {
        let mut customers = self.customers.write().await;
        if customers
            .iter()
            .any(|c| c.customer_id == customer.customer_id)
        {
            return Err(MilkmanError::Conflict(format!(
                "customer {} already exists",
                customer.customer_id
            )));
        }
        if customers.iter().any(|c| clashes(&customer, c)) {
            return Err(already_registered());
        }

        customer.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        customers.push(customer.clone());
        Ok(customer)
    }

    async fn update(&self, mut customer: Customer) -> Result<Customer> {
        let mut customers = self.customers.write().await;
        if customers.iter().any(|c| clashes(&customer, c)) {
            return Err(already_registered());
        }

        let slot = customers
            .iter_mut()
            .find(|c| c.customer_id == customer.customer_id)
            .ok_or_else(|| MilkmanError::NotFound(format!("customer {}", customer.customer_id)))?;

        customer.id = slot.id;
        *slot = customer.clone();
        Ok(customer)
    }

    async fn find_active_by_phone(&self, phone: &str) -> Result<Option<Customer>> {
        let customers = self.customers.read().await;
        Ok(customers
            .iter()
            .find(|c| c.is_active() && c.primary_phone == phone)
            .cloned())
    }

    async fn find_active_by_login(&self, email_or_phone: &str) -> Result<Option<Customer>> {
        let customers = self.customers.read().await;
        Ok(customers
            .iter()
            .find(|c| c.is_active() && c.matches_login(email_or_phone))
            .cloned())
    }

    async fn find_active_conflicts(
        &self,
        email: Option<&str>,
        phone: &str,
    ) -> Result<Vec<Customer>> {
        let customers = self.customers.read().await;
        Ok(customers
            .iter()
            .filter(|c| c.is_active())
            .filter(|c| {
                c.primary_phone == phone
                    || (email.is_some() && c.email_id.as_deref() == email)
            })
            .cloned()
            .collect())
    }

    async fn find_by_customer_id(&self, customer_id: &str) -> Result<Option<Customer>> {
        let customers = self.customers.read().await;
        Ok(customers
            .iter()
            .find(|c| c.customer_id == customer_id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Customer>> {
        Ok(self.customers.read().await.clone())
    }

    async fn delete(&self, customer_id: &str) -> Result<bool> {
        let mut customers = self.customers.write().await;
        let before = customers.len();
        customers.retain(|c| c.customer_id != customer_id);
        Ok(customers.len() != before)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// PostgreSQL store
// ============================================================================

const CUSTOMER_COLUMNS: &str = "id, customerid, firstname, lastname, pphone, sphone, emailid, dob, \
     auth_pin, address, pincode, landmark, createdby, createdtime, updatedby, updatedtime, \
     status, role";

const SCHEMA: &str = r#"
CREATE SCHEMA IF NOT EXISTS milkman;
CREATE TABLE IF NOT EXISTS milkman.customers (
    id          BIGSERIAL PRIMARY KEY,
    customerid  TEXT NOT NULL UNIQUE,
    firstname   TEXT NOT NULL,
    lastname    TEXT NOT NULL,
    pphone      TEXT NOT NULL,
    sphone      TEXT,
    emailid     TEXT,
    dob         DATE,
    auth_pin    TEXT NOT NULL,
    address     TEXT,
    pincode     TEXT,
    landmark    TEXT,
    createdby   TEXT NOT NULL,
    createdtime TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updatedby   TEXT NOT NULL,
    updatedtime TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    status      TEXT NOT NULL DEFAULT 'ACTIVE',
    role        TEXT NOT NULL DEFAULT 'CUSTOMER'
);
CREATE INDEX IF NOT EXISTS customers_pphone_idx ON milkman.customers (pphone);
CREATE UNIQUE INDEX IF NOT EXISTS customers_active_pphone_key
    ON milkman.customers (pphone) WHERE status = 'ACTIVE';
CREATE UNIQUE INDEX IF NOT EXISTS customers_active_emailid_key
    ON milkman.customers (emailid) WHERE status = 'ACTIVE' AND emailid IS NOT NULL;
"#;

/// PostgreSQL customer store
pub struct PgCustomerStore {
    pool: PgPool,
}

impl PgCustomerStore {
    /// Create a new store connection
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| MilkmanError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create the customers table if it does not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| MilkmanError::DatabaseError(format!("Failed to create schema: {e}")))?;
        Ok(())
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<Customer>> {
        let query = format!("SELECT {CUSTOMER_COLUMNS} FROM milkman.customers WHERE {clause} LIMIT 1");
        let row: Option<CustomerRow> = sqlx::query_as(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MilkmanError::DatabaseError(format!("Failed to fetch customer: {e}")))?;

        row.map(Customer::try_from).transpose()
    }
}

/// Map a write failure, turning unique-index violations into `Conflict`
fn write_error(context: &str, err: sqlx::Error) -> MilkmanError {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => already_registered(),
        _ => MilkmanError::DatabaseError(format!("{context}: {err}")),
    }
}

/// Customer row from database
#[derive(Debug, FromRow)]
struct CustomerRow {
    id: i64,
    customerid: String,
    firstname: String,
    lastname: String,
    pphone: String,
    sphone: Option<String>,
    emailid: Option<String>,
    dob: Option<NaiveDate>,
    auth_pin: String,
    address: Option<String>,
    pincode: Option<String>,
    landmark: Option<String>,
    createdby: String,
    createdtime: DateTime<Utc>,
    updatedby: String,
    updatedtime: DateTime<Utc>,
    status: String,
    role: String,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = MilkmanError;

    fn try_from(row: CustomerRow) -> Result<Self> {
        Ok(Customer {
            id: row.id,
            customer_id: row.customerid,
            first_name: row.firstname,
            last_name: row.lastname,
            primary_phone: row.pphone,
            secondary_phone: row.sphone,
            email_id: row.emailid,
            date_of_birth: row.dob,
            auth_pin_hash: row.auth_pin,
            address: row.address,
            pincode: row.pincode,
            landmark: row.landmark,
            status: row.status.parse::<CustomerStatus>()?,
            role: row.role,
            created_by: row.createdby,
            created_time: row.createdtime,
            updated_by: row.updatedby,
            updated_time: row.updatedtime,
        })
    }
}

#[async_trait]
impl CustomerStore for PgCustomerStore {
    async fn insert(&self, customer: Customer) -> Result<Customer> {
        let query = format!(
            r#"
            INSERT INTO milkman.customers (
                customerid, firstname, lastname, pphone, sphone, emailid, dob,
                auth_pin, address, pincode, landmark,
                createdby, createdtime, updatedby, updatedtime, status, role
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7,
                $8, $9, $10, $11,
                $12, $13, $14, $15, $16, $17
            )
            RETURNING {CUSTOMER_COLUMNS}
            "#
        );

        let row: CustomerRow = sqlx::query_as(&query)
            .bind(&customer.customer_id)
            .bind(&customer.first_name)
            .bind(&customer.last_name)
            .bind(&customer.primary_phone)
            .bind(&customer.secondary_phone)
            .bind(&customer.email_id)
            .bind(customer.date_of_birth)
            .bind(&customer.auth_pin_hash)
            .bind(&customer.address)
            .bind(&customer.pincode)
            .bind(&customer.landmark)
            .bind(&customer.created_by)
            .bind(customer.created_time)
            .bind(&customer.updated_by)
            .bind(customer.updated_time)
            .bind(customer.status.as_str())
            .bind(&customer.role)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| write_error("Failed to create customer", e))?;

        Customer::try_from(row)
    }

    async fn update(&self, customer: Customer) -> Result<Customer> {
        let query = format!(
            r#"
            UPDATE milkman.customers SET
                firstname = $2, lastname = $3, pphone = $4, sphone = $5, emailid = $6,
                dob = $7, auth_pin = $8, address = $9, pincode = $10, landmark = $11,
                updatedby = $12, updatedtime = $13, status = $14, role = $15
            WHERE customerid = $1
            RETURNING {CUSTOMER_COLUMNS}
            "#
        );

        let row: Option<CustomerRow> = sqlx::query_as(&query)
            .bind(&customer.customer_id)
            .bind(&customer.first_name)
            .bind(&customer.last_name)
            .bind(&customer.primary_phone)
            .bind(&customer.secondary_phone)
            .bind(&customer.email_id)
            .bind(customer.date_of_birth)
            .bind(&customer.auth_pin_hash)
            .bind(&customer.address)
            .bind(&customer.pincode)
            .bind(&customer.landmark)
            .bind(&customer.updated_by)
            .bind(customer.updated_time)
            .bind(customer.status.as_str())
            .bind(&customer.role)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| write_error("Failed to update customer", e))?;

        match row {
            Some(row) => Customer::try_from(row),
            None => Err(MilkmanError::NotFound(format!("customer {}", customer.customer_id))),
        }
    }

    async fn find_active_by_phone(&self, phone: &str) -> Result<Option<Customer>> {
        self.fetch_one_where("pphone = $1 AND status = 'ACTIVE'", phone)
            .await
    }

    async fn find_active_by_login(&self, email_or_phone: &str) -> Result<Option<Customer>> {
        self.fetch_one_where(
            "(emailid = $1 OR pphone = $1) AND status = 'ACTIVE'",
            email_or_phone,
        )
        .await
    }

    async fn find_active_conflicts(
        &self,
        email: Option<&str>,
        phone: &str,
    ) -> Result<Vec<Customer>> {
        let query = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM milkman.customers \
             WHERE (emailid = $1 OR pphone = $2) AND status = 'ACTIVE'"
        );
        let rows: Vec<CustomerRow> = sqlx::query_as(&query)
            .bind(email)
            .bind(phone)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MilkmanError::DatabaseError(format!("Failed to check customers: {e}")))?;

        rows.into_iter().map(Customer::try_from).collect()
    }

    async fn find_by_customer_id(&self, customer_id: &str) -> Result<Option<Customer>> {
        self.fetch_one_where("customerid = $1", customer_id).await
    }

    async fn list(&self) -> Result<Vec<Customer>> {
        let query = format!("SELECT {CUSTOMER_COLUMNS} FROM milkman.customers ORDER BY id");
        let rows: Vec<CustomerRow> = sqlx::query_as(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MilkmanError::DatabaseError(format!("Failed to list customers: {e}")))?;

        rows.into_iter().map(Customer::try_from).collect()
    }

    async fn delete(&self, customer_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM milkman.customers WHERE customerid = $1")
            .bind(customer_id)
            .execute(&self.pool)
            .await
            .map_err(|e| MilkmanError::DatabaseError(format!("Failed to delete customer: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| MilkmanError::DatabaseError(format!("Ping failed: {e}")))?;
        Ok(())
    }
}
