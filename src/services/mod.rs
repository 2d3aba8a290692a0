pub mod material_search;
