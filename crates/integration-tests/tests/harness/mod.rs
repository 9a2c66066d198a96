pub mod mock_odoo;
