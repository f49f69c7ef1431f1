//! Named accessors for the built-in tables
//!
//! Each wrapper is a thin layer over the session's [`TableAccessor`] for that
//! table: one setter/getter pair per input column and one getter per computed
//! column. Every generic method stays reachable through `Deref`.

use tablewright_common::catalog::{
    BUSINESS_TRAVEL, MOBILE_COMBUSTION, PURCHASED_ELECTRICITY, REFRIGERANTS, STATIONARY_COMBUSTION, WASTE,
};
use tablewright_common::Result;

use crate::session::Session;

/// Generate a named wrapper around the session's accessor for one table
#[macro_export]
macro_rules! named_table {
    (
        $(#[$meta:meta])*
        $name:ident => $table_id:path {
            inputs { $($column:literal => $setter:ident, $getter:ident;)* }
            computed { $($computed:literal => $reader:ident;)* }
        }
    ) => {
        $(#[$meta])*
        pub struct $name {
            inner: ::std::sync::Arc<$crate::table::TableAccessor>,
        }

        impl $name {
            pub const TABLE_ID: &'static str = $table_id;

            /// Column names this wrapper addresses
            pub const COLUMNS: &'static [&'static str] = &[$($column,)* $($computed,)*];

            /// The generic accessor shared with `Session::table`
            pub fn accessor(&self) -> &::std::sync::Arc<$crate::table::TableAccessor> {
                &self.inner
            }

            $(
                pub async fn $setter(&self, row: usize, value: &str) -> $crate::Result<()> {
                    self.inner.set_field($column, row, value).await
                }

                pub async fn $getter(&self, row: usize) -> $crate::Result<String> {
                    self.inner.get_field($column, row).await
                }
            )*

            $(
                pub async fn $reader(&self, row: usize) -> $crate::Result<String> {
                    self.inner.get_field($computed, row).await
                }
            )*
        }

        impl ::std::ops::Deref for $name {
            type Target = $crate::table::TableAccessor;

            fn deref(&self) -> &Self::Target {
                &self.inner
            }
        }

        impl $crate::session::PageObject for $name {
            const KIND: &'static str = concat!("named:", stringify!($name));
            const GROUP: $crate::cache::CacheGroup = $crate::cache::CacheGroup::TableAccessors;

            fn build(session: &mut $crate::session::Session) -> $crate::Result<Self> {
                Ok(Self {
                    inner: session.table(Self::TABLE_ID)?,
                })
            }
        }
    };
}

named_table! {
    /// Stationary combustion (boilers, generators, furnaces)
    StationaryCombustion => STATIONARY_COMBUSTION {
        inputs {
            "fuel" => set_fuel, fuel;
            "emission_factor" => set_emission_factor, emission_factor;
            "consumption" => set_consumption, consumption;
            "units" => set_units, units;
        }
        computed {
            "emissions" => emissions;
        }
    }
}

named_table! {
    /// Mobile combustion (fleet vehicles)
    MobileCombustion => MOBILE_COMBUSTION {
        inputs {
            "vehicle" => set_vehicle, vehicle;
            "fuel" => set_fuel, fuel;
            "emission_factor" => set_emission_factor, emission_factor;
            "consumption" => set_consumption, consumption;
            "units" => set_units, units;
        }
        computed {
            "emissions" => emissions;
        }
    }
}

named_table! {
    Refrigerants => REFRIGERANTS {
        inputs {
            "gas" => set_gas, gas;
            "emission_factor" => set_emission_factor, emission_factor;
            "consumption" => set_consumption, consumption;
            "units" => set_units, units;
        }
        computed {
            "emissions" => emissions;
        }
    }
}

named_table! {
    PurchasedElectricity => PURCHASED_ELECTRICITY {
        inputs {
            "site" => set_site, site;
            "emission_factor" => set_emission_factor, emission_factor;
            "consumption" => set_consumption, consumption;
            "units" => set_units, units;
        }
        computed {
            "emissions" => emissions;
        }
    }
}

named_table! {
    Waste => WASTE {
        inputs {
            "treatment" => set_treatment, treatment;
            "emission_factor" => set_emission_factor, emission_factor;
            "consumption" => set_consumption, consumption;
            "units" => set_units, units;
        }
        computed {
            "emissions" => emissions;
        }
    }
}

named_table! {
    BusinessTravel => BUSINESS_TRAVEL {
        inputs {
            "route" => set_route, route;
            "emission_factor" => set_emission_factor, emission_factor;
            "consumption" => set_consumption, consumption;
            "units" => set_units, units;
        }
        computed {
            "emissions" => emissions;
        }
    }
}

/// Build every named wrapper of a session, sharing accessors with `Session::table`
pub fn warm_all(session: &mut Session) -> Result<usize> {
    session.page_object::<StationaryCombustion>()?;
    session.page_object::<MobileCombustion>()?;
    session.page_object::<Refrigerants>()?;
    session.page_object::<PurchasedElectricity>()?;
    session.page_object::<Waste>()?;
    session.page_object::<BusinessTravel>()?;
    Ok(session.cache().len())
}

/// Table id and column names of every named wrapper
pub fn named_columns() -> [(&'static str, &'static [&'static str]); 6] {
    [
        (StationaryCombustion::TABLE_ID, StationaryCombustion::COLUMNS),
        (MobileCombustion::TABLE_ID, MobileCombustion::COLUMNS),
        (Refrigerants::TABLE_ID, Refrigerants::COLUMNS),
        (PurchasedElectricity::TABLE_ID, PurchasedElectricity::COLUMNS),
        (Waste::TABLE_ID, Waste::COLUMNS),
        (BusinessTravel::TABLE_ID, BusinessTravel::COLUMNS),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cache::CacheGroup;
    use crate::mock::MockPage;
    use tablewright_common::{HarnessConfig, SchemaCatalog};

    fn session() -> Session {
        Session::new(Arc::new(MockPage::new()), &SchemaCatalog::builtin(), HarnessConfig::default()).unwrap()
    }

    #[test]
    fn test_named_columns_match_catalog() {
        let catalog = SchemaCatalog::builtin();
        for (table_id, columns) in named_columns() {
            let schema = catalog.get(table_id).unwrap();
            assert_eq!(columns.len(), schema.columns.len(), "{table_id}");
            for column in columns {
                assert!(schema.find_column(column).is_some(), "{table_id}.{column}");
            }
        }
    }

    #[test]
    fn test_named_and_generic_share_one_accessor() {
        let mut session = session();
        let named = session.page_object::<StationaryCombustion>().unwrap();
        let generic_accessor = session.table(STATIONARY_COMBUSTION).unwrap();
        assert!(Arc::ptr_eq(named.accessor(), &generic_accessor));
    }

    #[test]
    fn test_warm_all() {
        let mut session = session();
        // six wrappers plus six generic accessors
        assert_eq!(warm_all(&mut session).unwrap(), 12);
        assert_eq!(session.reset_group(CacheGroup::TableAccessors), 12);
    }
}
