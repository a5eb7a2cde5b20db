use super::DatabaseId;

/// Static description of a database's tables, used only as generation context.
pub trait SchemaProvider: Send + Sync {
    fn schema_for(&self, database: DatabaseId) -> &str;
}

pub const HOSPITAL_SCHEMA: &str = r#"
Hospital database (hospital_db) tables:

1. doctors (doctor information)
   - doctor_id: VARCHAR(10) - doctor id (primary key)
   - doctor_name: VARCHAR(50) - doctor name
   - department: VARCHAR(50) - department
   - title: VARCHAR(50) - professional title / role

2. patients (patient information)
   - patient_id: VARCHAR(10) - patient id (primary key)
   - patient_name: VARCHAR(50) - patient name
   - gender: VARCHAR(10) - gender
   - birth_date: DATE - date of birth
   - contact_number: VARCHAR(20) - phone number
   - primary_doctor_id: VARCHAR(10) - attending doctor (foreign key doctors.doctor_id)

3. medical_records (visit records)
   - record_id: INT - record id (primary key, serial)
   - patient_id: VARCHAR(10) - patient (foreign key patients.patient_id)
   - doctor_id: VARCHAR(10) - treating doctor (foreign key doctors.doctor_id)
   - visit_date: TIMESTAMP - visit date
   - diagnosis: TEXT - diagnosis
   - prescription: TEXT - prescription
"#;

pub const WAREHOUSE_SCHEMA: &str = r#"
Warehouse database (warehouse_db) tables:

1. warehouse_staff (warehouse employees)
   - staff_id: VARCHAR(10) - employee id (primary key)
   - staff_name: VARCHAR(50) - employee name
   - role: VARCHAR(50) - position (Manager/Operator)

2. products (product catalogue)
   - product_id: VARCHAR(10) - product id (primary key)
   - product_name: VARCHAR(100) - product name
   - description: TEXT - description
   - price: DECIMAL(10,2) - unit price
   - supplier: VARCHAR(100) - supplier

3. inventory (stock levels)
   - inventory_id: INT - stock record id (primary key, serial)
   - product_id: VARCHAR(10) - product (foreign key products.product_id)
   - warehouse_location: VARCHAR(20) - storage location
   - quantity: INT - quantity in stock
   - last_updated: TIMESTAMP - last update time

4. shipments (inbound/outbound movements)
   - shipment_id: INT - record id (primary key, serial)
   - product_id: VARCHAR(10) - product (foreign key products.product_id)
   - staff_id: VARCHAR(10) - handling employee (foreign key warehouse_staff.staff_id)
   - quantity_change: INT - quantity change (positive inbound, negative outbound)
   - record_time: TIMESTAMP - movement time
   - type: VARCHAR(20) - INBOUND or OUTBOUND
"#;

#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSchemaProvider;

impl SchemaProvider for StaticSchemaProvider {
    fn schema_for(&self, database: DatabaseId) -> &str {
        match database {
            DatabaseId::Hospital => HOSPITAL_SCHEMA,
            DatabaseId::Warehouse => WAREHOUSE_SCHEMA,
        }
    }
}
