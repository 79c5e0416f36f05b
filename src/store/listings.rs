//! Listing rows

use chrono::{DateTime, Utc};
use rusqlite::{named_params, params, Connection, OptionalExtension, Row};

use super::{decimal_column, decimal_param};
use crate::errors::Result;
use crate::models::{ForeignRef, Listing, ListingFlags};

const LISTING_COLUMNS: &str = "id, ref, sync_code, title, description, short_description, \
    city_id, city_name, neighborhood_id, neighborhood_name, property_type_id, property_type_name, \
    usage_type_id, usage_type_name, status_id, status_name, consignment_type_id, consignment_type_name, \
    advisor_id, advisor_name, built_area, private_area, land_area, area, rooms, bathrooms, garages, \
    stratum, sale_price, rent_price, admin_fee, total_price, address, latitude, longitude, slug, \
    active, featured, hot, created_at, updated_at, synced_at, data_hash";

fn foreign(row: &Row<'_>, prefix: &str) -> rusqlite::Result<ForeignRef> {
    Ok(ForeignRef {
        id: row.get(format!("{}_id", prefix).as_str())?,
        name: row.get(format!("{}_name", prefix).as_str())?,
    })
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<Listing> {
    Ok(Listing {
        id: row.get("id")?,
        reference: row.get("ref")?,
        sync_code: row.get("sync_code")?,
        title: row.get("title")?,
        description: row.get("description")?,
        short_description: row.get("short_description")?,
        city: foreign(row, "city")?,
        neighborhood: foreign(row, "neighborhood")?,
        property_type: foreign(row, "property_type")?,
        usage_type: foreign(row, "usage_type")?,
        status: foreign(row, "status")?,
        consignment_type: foreign(row, "consignment_type")?,
        advisor: foreign(row, "advisor")?,
        built_area: decimal_column(row, "built_area")?,
        private_area: decimal_column(row, "private_area")?,
        land_area: decimal_column(row, "land_area")?,
        area: decimal_column(row, "area")?,
        rooms: row.get("rooms")?,
        bathrooms: row.get("bathrooms")?,
        garages: row.get("garages")?,
        stratum: row.get("stratum")?,
        sale_price: decimal_column(row, "sale_price")?,
        rent_price: decimal_column(row, "rent_price")?,
        admin_fee: decimal_column(row, "admin_fee")?,
        total_price: decimal_column(row, "total_price")?,
        address: row.get("address")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        slug: row.get("slug")?,
        flags: ListingFlags {
            active: row.get("active")?,
            featured: row.get("featured")?,
            hot: row.get("hot")?,
        },
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        synced_at: row.get("synced_at")?,
        data_hash: row.get("data_hash")?,
    })
}

pub fn find_by_ref(conn: &Connection, reference: i64) -> Result<Option<Listing>> {
    let sql = format!("SELECT {} FROM listings WHERE ref = ?1", LISTING_COLUMNS);
    let listing = conn
        .query_row(&sql, params![reference], listing_from_row)
        .optional()?;
    Ok(listing)
}

/// All listings, newest reference first
pub fn all(conn: &Connection) -> Result<Vec<Listing>> {
    let sql = format!("SELECT {} FROM listings ORDER BY ref DESC", LISTING_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let listings = stmt
        .query_map([], listing_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(listings)
}

pub fn insert(conn: &Connection, listing: &Listing) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO listings (
            ref, sync_code, title, description, short_description,
            city_id, city_name, neighborhood_id, neighborhood_name,
            property_type_id, property_type_name, usage_type_id, usage_type_name,
            status_id, status_name, consignment_type_id, consignment_type_name,
            advisor_id, advisor_name, built_area, private_area, land_area, area,
            rooms, bathrooms, garages, stratum, sale_price, rent_price, admin_fee, total_price,
            address, latitude, longitude, slug, active, featured, hot,
            created_at, updated_at, synced_at, data_hash
        ) VALUES (
            :ref, :sync_code, :title, :description, :short_description,
            :city_id, :city_name, :neighborhood_id, :neighborhood_name,
            :property_type_id, :property_type_name, :usage_type_id, :usage_type_name,
            :status_id, :status_name, :consignment_type_id, :consignment_type_name,
            :advisor_id, :advisor_name, :built_area, :private_area, :land_area, :area,
            :rooms, :bathrooms, :garages, :stratum, :sale_price, :rent_price, :admin_fee, :total_price,
            :address, :latitude, :longitude, :slug, :active, :featured, :hot,
            :created_at, :updated_at, :synced_at, :data_hash
        )
        "#,
        named_params! {
            ":ref": listing.reference,
            ":sync_code": listing.sync_code,
            ":title": listing.title,
            ":description": listing.description,
            ":short_description": listing.short_description,
            ":city_id": listing.city.id,
            ":city_name": listing.city.name,
            ":neighborhood_id": listing.neighborhood.id,
            ":neighborhood_name": listing.neighborhood.name,
            ":property_type_id": listing.property_type.id,
            ":property_type_name": listing.property_type.name,
            ":usage_type_id": listing.usage_type.id,
            ":usage_type_name": listing.usage_type.name,
            ":status_id": listing.status.id,
            ":status_name": listing.status.name,
            ":consignment_type_id": listing.consignment_type.id,
            ":consignment_type_name": listing.consignment_type.name,
            ":advisor_id": listing.advisor.id,
            ":advisor_name": listing.advisor.name,
            ":built_area": decimal_param(listing.built_area),
            ":private_area": decimal_param(listing.private_area),
            ":land_area": decimal_param(listing.land_area),
            ":area": decimal_param(listing.area),
            ":rooms": listing.rooms,
            ":bathrooms": listing.bathrooms,
            ":garages": listing.garages,
            ":stratum": listing.stratum,
            ":sale_price": decimal_param(listing.sale_price),
            ":rent_price": decimal_param(listing.rent_price),
            ":admin_fee": decimal_param(listing.admin_fee),
            ":total_price": decimal_param(listing.total_price),
            ":address": listing.address,
            ":latitude": listing.latitude,
            ":longitude": listing.longitude,
            ":slug": listing.slug,
            ":active": listing.flags.active,
            ":featured": listing.flags.featured,
            ":hot": listing.flags.hot,
            ":created_at": listing.created_at,
            ":updated_at": listing.updated_at,
            ":synced_at": listing.synced_at,
            ":data_hash": listing.data_hash,
        },
    )?;
    Ok(conn.last_insert_rowid())
}

/// Overwrite every synced column of an existing listing.
///
/// The write only applies if the row still carries `expected_synced_at`;
/// a return of 0 means another writer got there first.
pub fn update(conn: &Connection, listing: &Listing, expected_synced_at: DateTime<Utc>) -> Result<usize> {
    let changed = conn.execute(
        r#"
        UPDATE listings SET
            sync_code = :sync_code, title = :title, description = :description,
            short_description = :short_description,
            city_id = :city_id, city_name = :city_name,
            neighborhood_id = :neighborhood_id, neighborhood_name = :neighborhood_name,
            property_type_id = :property_type_id, property_type_name = :property_type_name,
            usage_type_id = :usage_type_id, usage_type_name = :usage_type_name,
            status_id = :status_id, status_name = :status_name,
            consignment_type_id = :consignment_type_id, consignment_type_name = :consignment_type_name,
            advisor_id = :advisor_id, advisor_name = :advisor_name,
            built_area = :built_area, private_area = :private_area, land_area = :land_area, area = :area,
            rooms = :rooms, bathrooms = :bathrooms, garages = :garages, stratum = :stratum,
            sale_price = :sale_price, rent_price = :rent_price, admin_fee = :admin_fee,
            total_price = :total_price, address = :address, latitude = :latitude,
            longitude = :longitude, slug = :slug,
            active = :active, featured = :featured, hot = :hot,
            updated_at = :updated_at, synced_at = :synced_at, data_hash = :data_hash
        WHERE ref = :ref AND synced_at = :expected_synced_at
        "#,
        named_params! {
            ":ref": listing.reference,
            ":sync_code": listing.sync_code,
            ":title": listing.title,
            ":description": listing.description,
            ":short_description": listing.short_description,
            ":city_id": listing.city.id,
            ":city_name": listing.city.name,
            ":neighborhood_id": listing.neighborhood.id,
            ":neighborhood_name": listing.neighborhood.name,
            ":property_type_id": listing.property_type.id,
            ":property_type_name": listing.property_type.name,
            ":usage_type_id": listing.usage_type.id,
            ":usage_type_name": listing.usage_type.name,
            ":status_id": listing.status.id,
            ":status_name": listing.status.name,
            ":consignment_type_id": listing.consignment_type.id,
            ":consignment_type_name": listing.consignment_type.name,
            ":advisor_id": listing.advisor.id,
            ":advisor_name": listing.advisor.name,
            ":built_area": decimal_param(listing.built_area),
            ":private_area": decimal_param(listing.private_area),
            ":land_area": decimal_param(listing.land_area),
            ":area": decimal_param(listing.area),
            ":rooms": listing.rooms,
            ":bathrooms": listing.bathrooms,
            ":garages": listing.garages,
            ":stratum": listing.stratum,
            ":sale_price": decimal_param(listing.sale_price),
            ":rent_price": decimal_param(listing.rent_price),
            ":admin_fee": decimal_param(listing.admin_fee),
            ":total_price": decimal_param(listing.total_price),
            ":address": listing.address,
            ":latitude": listing.latitude,
            ":longitude": listing.longitude,
            ":slug": listing.slug,
            ":active": listing.flags.active,
            ":featured": listing.flags.featured,
            ":hot": listing.flags.hot,
            ":updated_at": listing.updated_at,
            ":synced_at": listing.synced_at,
            ":data_hash": listing.data_hash,
            ":expected_synced_at": expected_synced_at,
        },
    )?;
    Ok(changed)
}

pub fn set_flags(conn: &Connection, reference: i64, flags: ListingFlags, now: DateTime<Utc>) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE listings SET active = ?1, featured = ?2, hot = ?3, updated_at = ?4 WHERE ref = ?5",
        params![flags.active, flags.featured, flags.hot, now, reference],
    )?;
    Ok(changed)
}

/// Forget the stored fingerprint so the next sync rewrites the listing
pub fn clear_hash(conn: &Connection, listing_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE listings SET data_hash = NULL WHERE id = ?1",
        params![listing_id],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, reference: i64) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM listings WHERE ref = ?1", params![reference])?;
    Ok(deleted)
}
