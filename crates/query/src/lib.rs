// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

pub mod token_price {
    use graphql_client::GraphQLQuery;
    type BigDecimal = String;

    #[derive(GraphQLQuery)]
    #[graphql(
        schema_path = "graphql/uniswap_v2.schema.graphql",
        query_path = "graphql/token_price.query.graphql",
        response_derives = "Debug",
        variables_derives = "Clone"
    )]
    pub struct TokenPrice;

    pub use token_price::*;
}

pub use token_price::TokenPrice;
