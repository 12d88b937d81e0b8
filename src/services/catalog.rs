//! Catalog: products, categories and CSV import/export.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{Paginated, Pagination};
use crate::domain::aggregates::{Category, Product, ProductDetails, ProductStatus};
use crate::domain::{Money, Sku};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::{FieldKind, Filter, Query, Sort};

const SEARCH_FIELDS: &[&str] = &["name", "description", "tags", "sku"];
const DEFAULT_WEIGHT_GRAMS: u32 = 500;
const LIST_SEPARATOR: char = '|';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Category slug.
    pub category: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub sort: ProductSort,
    /// Admin listings only; the storefront always sees active products.
    pub status: Option<ProductStatus>,
}

impl ProductListParams {
    fn pagination(&self) -> Pagination {
        Pagination { page: self.page, per_page: self.per_page }
    }
}

/// Who is looking at the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Storefront,
    Admin,
}

pub async fn list_products(
    state: &AppState,
    params: &ProductListParams,
    audience: Audience,
) -> AppResult<Paginated<Product>> {
    let pagination = params.pagination();
    let mut filter = Filter::new().search(SEARCH_FIELDS, params.search.as_deref().unwrap_or_default());

    match (audience, params.status) {
        (Audience::Storefront, _) => filter = filter.eq("status", ProductStatus::Active),
        (Audience::Admin, Some(status)) => filter = filter.eq("status", status),
        (Audience::Admin, None) => {}
    }

    if let Some(slug) = params.category.as_deref().filter(|s| !s.trim().is_empty()) {
        let Some(category) = find_category_by_slug(state, slug).await? else {
            return Ok(Paginated::new(vec![], 0, pagination));
        };
        filter = filter.eq("category_id", category.id);
    }

    let sort = match params.sort {
        ProductSort::Newest => Sort::Newest,
        ProductSort::PriceAsc => Sort::Ascending("price.amount", FieldKind::Number),
        ProductSort::PriceDesc => Sort::Descending("price.amount", FieldKind::Number),
    };

    let query = Query::new(filter).sorted(sort).paged(pagination.to_page());
    let (products, total) = state.collection::<Product>().find(&query).await?;
    Ok(Paginated::new(products, total, pagination))
}

/// Storefront lookup: drafts and archived products are hidden.
pub async fn get_active_product(state: &AppState, id: Uuid) -> AppResult<Product> {
    get_product(state, id)
        .await?
        .filter(Product::is_active)
        .ok_or_else(|| AppError::not_found("Product"))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<Option<Product>> {
    Ok(state.collection::<Product>().get(id).await?)
}

pub async fn find_product_by_sku(state: &AppState, sku: &Sku) -> AppResult<Option<Product>> {
    Ok(state.collection::<Product>().find_one(Filter::new().eq("sku", sku)).await?)
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProductInput {
    pub sku: Option<String>,
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 5000, message = "Description is too long"))]
    pub description: String,
    pub price: Decimal,
    pub mrp: Option<Decimal>,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub stock: Option<u32>,
    pub weight_grams: Option<u32>,
    pub status: Option<ProductStatus>,
}

impl ProductInput {
    fn details(&self, currency: &str) -> ProductDetails {
        ProductDetails {
            name: self.name.clone(),
            description: self.description.trim().to_string(),
            price: Money::new(self.price, currency),
            mrp: self.mrp.map(|m| Money::new(m, currency)),
            category_id: self.category_id,
            sizes: clean_list(self.sizes.iter().map(String::as_str)),
            images: clean_list(self.images.iter().map(String::as_str)),
            tags: clean_list(self.tags.iter().map(String::as_str)),
            weight_grams: self.weight_grams.unwrap_or(DEFAULT_WEIGHT_GRAMS),
        }
    }
}

pub async fn create_product(state: &AppState, input: ProductInput) -> AppResult<Product> {
    input.validate()?;
    let sku = match input.sku.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => Sku::new(raw)?,
        None => Sku::generate(),
    };
    if find_product_by_sku(state, &sku).await?.is_some() {
        return Err(AppError::Conflict(format!("SKU {sku} is already in use")));
    }
    ensure_category_exists(state, input.category_id).await?;

    let mut product = Product::create(sku, input.details(&state.config().commerce.currency))?;
    product.set_stock(input.stock.unwrap_or(0));
    if let Some(status) = input.status {
        product.set_status(status)?;
    }
    state.collection::<Product>().insert(&product).await?;
    state.events().publish_all(product.take_events()).await;
    tracing::info!(product_id = %product.id(), sku = %product.sku(), "Product created");
    Ok(product)
}

pub async fn update_product(state: &AppState, id: Uuid, input: ProductInput) -> AppResult<Product> {
    input.validate()?;
    let mut product = get_product(state, id).await?.ok_or_else(|| AppError::not_found("Product"))?;
    ensure_category_exists(state, input.category_id).await?;

    product.update(input.details(&state.config().commerce.currency))?;
    if let Some(stock) = input.stock {
        product.set_stock(stock);
    }
    if let Some(status) = input.status {
        product.set_status(status)?;
    }
    save_product(state, &mut product).await?;
    Ok(product)
}

/// Products are archived rather than removed; orders keep referring to them.
pub async fn archive_product(state: &AppState, id: Uuid) -> AppResult<Product> {
    let mut product = get_product(state, id).await?.ok_or_else(|| AppError::not_found("Product"))?;
    product.archive();
    save_product(state, &mut product).await?;
    Ok(product)
}

/// Adds (positive) or removes (negative) stock.
pub async fn adjust_stock(state: &AppState, id: Uuid, delta: i64) -> AppResult<Product> {
    let mut product = get_product(state, id).await?.ok_or_else(|| AppError::not_found("Product"))?;
    let amount = u32::try_from(delta.unsigned_abs())
        .map_err(|_| AppError::BadRequest("Stock adjustment is too large".into()))?;
    if delta >= 0 {
        product.add_stock(amount);
    } else {
        product.remove_stock(amount)?;
    }
    save_product(state, &mut product).await?;
    Ok(product)
}

pub(crate) async fn save_product(state: &AppState, product: &mut Product) -> AppResult<()> {
    if !state.collection::<Product>().save(product).await? {
        return Err(AppError::not_found("Product"));
    }
    state.events().publish_all(product.take_events()).await;
    Ok(())
}

async fn ensure_category_exists(state: &AppState, category_id: Option<Uuid>) -> AppResult<()> {
    if let Some(id) = category_id {
        if state.collection::<Category>().get(id).await?.is_none() {
            return Err(AppError::BadRequest("Unknown category".into()));
        }
    }
    Ok(())
}

// =============================================================================
// Categories
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CategoryInput {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(url(message = "Image must be a URL"))]
    pub image_url: Option<String>,
    #[serde(default)]
    pub position: i32,
}

/// Ordered by position, then name.
pub async fn list_categories(state: &AppState) -> AppResult<Vec<Category>> {
    let mut categories = state.collection::<Category>().all(Filter::new(), Sort::Oldest).await?;
    categories.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.name.cmp(&b.name)));
    Ok(categories)
}

pub async fn find_category_by_slug(state: &AppState, slug: &str) -> AppResult<Option<Category>> {
    let slug = slug.trim().to_lowercase();
    Ok(state.collection::<Category>().find_one(Filter::new().eq("slug", slug)).await?)
}

pub async fn get_category(state: &AppState, id: Uuid) -> AppResult<Category> {
    state.collection::<Category>().get(id).await?.ok_or_else(|| AppError::not_found("Category"))
}

pub async fn create_category(state: &AppState, input: CategoryInput) -> AppResult<Category> {
    input.validate()?;
    let category = Category::new(&input.name, input.description, input.image_url, input.position);
    if category.slug.is_empty() {
        return Err(AppError::BadRequest("Name must contain letters or digits".into()));
    }
    if find_category_by_slug(state, &category.slug).await?.is_some() {
        return Err(AppError::Conflict(format!("Category {} already exists", category.slug)));
    }
    state.collection::<Category>().insert(&category).await?;
    Ok(category)
}

pub async fn update_category(state: &AppState, id: Uuid, input: CategoryInput) -> AppResult<Category> {
    input.validate()?;
    let mut category = get_category(state, id).await?;
    category.rename(&input.name);
    if let Some(existing) = find_category_by_slug(state, &category.slug).await? {
        if existing.id != id {
            return Err(AppError::Conflict(format!("Category {} already exists", category.slug)));
        }
    }
    category.description = input.description;
    category.image_url = input.image_url;
    category.position = input.position;
    state.collection::<Category>().save(&category).await?;
    Ok(category)
}

/// Refuses while any product still points at the category.
pub async fn delete_category(state: &AppState, id: Uuid) -> AppResult<()> {
    let in_use = state.collection::<Product>().count(Filter::new().eq("category_id", id)).await?;
    if in_use > 0 {
        return Err(AppError::Conflict(format!("Category is used by {in_use} product(s)")));
    }
    if !state.collection::<Category>().delete(id).await? {
        return Err(AppError::not_found("Category"));
    }
    Ok(())
}

// =============================================================================
// CSV import / export
// =============================================================================

/// One product per CSV row. List fields are `|`-separated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCsvRow {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: String,
    #[serde(default)]
    pub mrp: Option<String>,
    /// Category slug.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sizes: Option<String>,
    #[serde(default)]
    pub images: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub stock: Option<u32>,
    #[serde(default)]
    pub weight_grams: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<ImportLineError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportLineError {
    pub line: usize,
    pub message: String,
}

/// Every product, archived ones included, as CSV.
pub async fn export_products_csv(state: &AppState) -> AppResult<Vec<u8>> {
    let products = state.collection::<Product>().all(Filter::new(), Sort::Oldest).await?;
    let slugs: HashMap<Uuid, String> = list_categories(state).await?.into_iter().map(|c| (c.id, c.slug)).collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    for product in &products {
        writer
            .serialize(to_csv_row(product, &slugs))
            .map_err(|e| AppError::Internal(format!("CSV export failed: {e}")))?;
    }
    writer.into_inner().map_err(|e| AppError::Internal(format!("CSV export failed: {e}")))
}

fn to_csv_row(product: &Product, slugs: &HashMap<Uuid, String>) -> ProductCsvRow {
    let join = |items: &[String]| (!items.is_empty()).then(|| items.join("|"));
    ProductCsvRow {
        sku: product.sku().to_string(),
        name: product.name().to_string(),
        description: Some(product.description().to_string()).filter(|d| !d.is_empty()),
        price: product.price().amount().to_string(),
        mrp: product.mrp().map(|m| m.amount().to_string()),
        category: product.category_id().and_then(|id| slugs.get(&id).cloned()),
        sizes: join(product.sizes()),
        images: join(product.images()),
        tags: join(product.tags()),
        stock: Some(product.stock().value()),
        weight_grams: Some(product.weight_grams()),
        status: Some(product.status().as_str().to_string()),
    }
}

/// Upserts products by SKU. Bad rows are reported and skipped.
pub async fn import_products_csv(state: &AppState, data: &[u8]) -> AppResult<ImportReport> {
    let slugs: HashMap<String, Uuid> = list_categories(state).await?.into_iter().map(|c| (c.slug, c.id)).collect();
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(data);
    let mut report = ImportReport::default();

    let rows: Vec<(usize, Result<ProductCsvRow, csv::Error>)> =
        reader.deserialize().enumerate().map(|(i, row)| (i + 2, row)).collect();

    for (line, row) in rows {
        let outcome = match row {
            Ok(row) => import_row(state, row, &slugs).await,
            Err(e) => Err(AppError::BadRequest(e.to_string())),
        };
        match outcome {
            Ok(true) => report.created += 1,
            Ok(false) => report.updated += 1,
            Err(e) => report.errors.push(ImportLineError { line, message: e.to_string() }),
        }
    }

    tracing::info!(created = report.created, updated = report.updated, errors = report.errors.len(), "Product import finished");
    Ok(report)
}

/// Returns true when the row created a new product.
async fn import_row(state: &AppState, row: ProductCsvRow, slugs: &HashMap<String, Uuid>) -> AppResult<bool> {
    let currency = &state.config().commerce.currency;
    let sku = Sku::new(&row.sku)?;
    let price = parse_decimal("price", &row.price)?;
    let mrp = row.mrp.as_deref().filter(|m| !m.is_empty()).map(|m| parse_decimal("mrp", m)).transpose()?;
    let category_id = match row.category.as_deref().filter(|c| !c.is_empty()) {
        Some(slug) => Some(
            *slugs
                .get(&slug.to_lowercase())
                .ok_or_else(|| AppError::BadRequest(format!("Unknown category {slug}")))?,
        ),
        None => None,
    };
    let status = row.status.as_deref().filter(|s| !s.is_empty()).map(str::parse::<ProductStatus>).transpose()?;

    let details = ProductDetails {
        name: row.name,
        description: row.description.unwrap_or_default(),
        price: Money::new(price, currency),
        mrp: mrp.map(|m| Money::new(m, currency)),
        category_id,
        sizes: split_list(row.sizes.as_deref()),
        images: split_list(row.images.as_deref()),
        tags: split_list(row.tags.as_deref()),
        weight_grams: row.weight_grams.unwrap_or(DEFAULT_WEIGHT_GRAMS),
    };

    let (mut product, created) = match find_product_by_sku(state, &sku).await? {
        Some(mut existing) => {
            existing.update(details)?;
            (existing, false)
        }
        None => (Product::create(sku, details)?, true),
    };
    if let Some(stock) = row.stock {
        product.set_stock(stock);
    }
    if let Some(status) = status {
        product.set_status(status)?;
    }

    if created {
        state.collection::<Product>().insert(&product).await?;
        state.events().publish_all(product.take_events()).await;
    } else {
        save_product(state, &mut product).await?;
    }
    Ok(created)
}

fn parse_decimal(field: &str, raw: &str) -> AppResult<Decimal> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid {field}: {raw}")))
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    clean_list(raw.unwrap_or_default().split(LIST_SEPARATOR))
}

fn clean_list<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    items.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(Some(" S | M ||L ")), vec!["S", "M", "L"]);
        assert!(split_list(None).is_empty());
    }

    #[test]
    fn test_csv_row_parses_blank_optionals() {
        let data = "sku,name,description,price,mrp,category,sizes,images,tags,stock,weight_grams,status\n\
                    kt-1,Kurta,,1299.00,,,S|M,,,5,,active\n";
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(data.as_bytes());
        let row: ProductCsvRow = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(row.sku, "kt-1");
        assert_eq!(row.mrp, None);
        assert_eq!(row.stock, Some(5));
        assert_eq!(row.weight_grams, None);
        assert_eq!(split_list(row.sizes.as_deref()), vec!["S", "M"]);
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("price", " 499.50 ").unwrap(), Decimal::new(49950, 2));
        assert!(parse_decimal("price", "free").is_err());
    }
}
